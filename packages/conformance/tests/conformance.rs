//! End-to-end conformance tests for the hierarchical groups node API.
//!
//! Each test spawns an ephemeral in-process node (real TCP, real HTTP) via
//! [`hgroups_conformance::spawn_node`] and exercises the API with a
//! `reqwest` client. Users are named by the `x-user-id` header; user 1 is a
//! site administrator on every node.
//!
//! # Coverage
//!
//! | Test | Area |
//! |------|------|
//! | `moderator_may_create_under_mod_policy` | subgroup creation policy |
//! | `unset_policy_admits_site_admins_only` | subgroup creation policy |
//! | `restricted_creation_blocks_everyone_else` | site-wide restriction |
//! | `kittens_permalink` | identifiers |
//! | `resolve_path_with_action` | identifiers |
//! | `ancestors_of_top_level_group_are_empty` | hierarchy |
//! | `descendants_exclude_self_and_duplicates` | hierarchy |
//! | `hidden_groups_are_pruned_for_outsiders` | visibility |
//! | `reparent_is_visible_immediately` | cache invalidation |
//! | `from_parents_scope_covers_ancestors` | activity aggregation |
//! | `from_none_scope_is_group_only` | activity aggregation |
//! | `strict_enforcement_denies_site_admins` | activity aggregation |
//! | `directory_tree_and_search` | directory |
//! | `sqlite_nodes_share_invalidation` | shared cache |

use hgroups::{ActivityEnforcement, EngineConfig};
use hgroups_conformance::{spawn_node, spawn_sqlite_node, Client, SITE_ADMIN};
use serde_json::json;

const MODERATOR: u64 = 20;
const MEMBER: u64 = 21;
const OUTSIDER: u64 = 22;

async fn node(engine: EngineConfig) -> Client {
    let (base_url, _) = spawn_node(engine).await;
    Client::new(base_url)
}

/// animals -> pets -> kittens, created by the site admin. Returns the ids.
async fn animals(c: &Client) -> (u64, u64, u64) {
    let animals = c.create_group(SITE_ADMIN, None, "animals", "Animals").await;
    let pets = c.create_group(SITE_ADMIN, Some(animals), "pets", "Pets").await;
    let kittens = c.create_group(SITE_ADMIN, Some(pets), "kittens", "Kittens").await;
    (animals, pets, kittens)
}

async fn grant(c: &Client, group: u64, user: u64, role: &str) {
    let (status, body) = c
        .put(&format!("/v1/groups/{group}/members/{user}"), Some(SITE_ADMIN), json!({ "role": role }))
        .await;
    assert_eq!(status, 204, "grant {role}: {body}");
}

// ---------------------------------------------------------------------------
// Subgroup creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn moderator_may_create_under_mod_policy() {
    let c = node(EngineConfig::default()).await;
    let (_, pets, _) = animals(&c).await;
    grant(&c, pets, MODERATOR, "mod").await;
    grant(&c, pets, MEMBER, "member").await;

    let (status, body) = c
        .put(&format!("/v1/groups/{pets}/settings"), Some(SITE_ADMIN), json!({ "subgroup_creators": "mod" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["subgroup_creators"], "mod");

    let (_, perms) = c.get(&format!("/v1/groups/{pets}/permissions"), Some(MODERATOR)).await;
    assert_eq!(perms["can_create_subgroup"], true);
    let (_, perms) = c.get(&format!("/v1/groups/{pets}/permissions"), Some(MEMBER)).await;
    assert_eq!(perms["can_create_subgroup"], false);

    let path = format!("/v1/groups/{pets}/subgroups");
    let (status, _) = c.post(&path, Some(MEMBER), json!({ "slug": "puppies" })).await;
    assert_eq!(status, 403);
    let (status, _) = c.post(&path, Some(MODERATOR), json!({ "slug": "puppies" })).await;
    assert_eq!(status, 201);
}

#[tokio::test]
async fn unset_policy_admits_site_admins_only() {
    let c = node(EngineConfig::default()).await;
    let (_, pets, _) = animals(&c).await;

    let (_, perms) = c.get(&format!("/v1/groups/{pets}/permissions"), Some(SITE_ADMIN)).await;
    assert_eq!(perms["can_create_subgroup"], true);
    let (_, perms) = c.get(&format!("/v1/groups/{pets}/permissions"), Some(OUTSIDER)).await;
    assert_eq!(perms["can_create_subgroup"], false);
    let (_, perms) = c.get(&format!("/v1/groups/{pets}/permissions"), None).await;
    assert_eq!(perms["can_create_subgroup"], false);
}

#[tokio::test]
async fn restricted_creation_blocks_everyone_else() {
    let c = node(EngineConfig {
        restrict_group_creation: true,
        ..Default::default()
    })
    .await;
    let (_, pets, _) = animals(&c).await;
    grant(&c, pets, MODERATOR, "admin").await;
    c.put(&format!("/v1/groups/{pets}/settings"), Some(SITE_ADMIN), json!({ "subgroup_creators": "member" }))
        .await;

    let (status, _) = c.post("/v1/groups", Some(OUTSIDER), json!({ "slug": "plants" })).await;
    assert_eq!(status, 403);
    let (status, _) = c
        .post(&format!("/v1/groups/{pets}/subgroups"), Some(MODERATOR), json!({ "slug": "puppies" }))
        .await;
    assert_eq!(status, 403);
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kittens_permalink() {
    let (base_url, _) = spawn_node(EngineConfig::default()).await;
    let c = Client::new(base_url.clone());
    let (_, _, kittens) = animals(&c).await;

    let (status, body) = c.get(&format!("/v1/groups/{kittens}/permalink"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["slug"], "animals/pets/kittens");
    assert_eq!(body["permalink"], format!("{base_url}/groups/animals/pets/kittens/"));
}

#[tokio::test]
async fn resolve_path_with_action() {
    let c = node(EngineConfig::default()).await;
    let (_, _, kittens) = animals(&c).await;

    let (status, body) = c.get("/v1/resolve/animals/pets/kittens/members", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["group"]["id"], kittens);
    assert_eq!(body["action_variables"], json!(["members"]));
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ancestors_of_top_level_group_are_empty() {
    let c = node(EngineConfig::default()).await;
    let (animals, pets, kittens) = animals(&c).await;

    let (_, body) = c.get(&format!("/v1/groups/{animals}/ancestors"), None).await;
    assert_eq!(body["ancestors"], json!([]));
    let (_, body) = c.get(&format!("/v1/groups/{kittens}/ancestors"), None).await;
    assert_eq!(body["ancestors"], json!([pets, animals]));
}

#[tokio::test]
async fn descendants_exclude_self_and_duplicates() {
    let c = node(EngineConfig::default()).await;
    let (animals, pets, kittens) = animals(&c).await;
    let dogs = c.create_group(SITE_ADMIN, Some(animals), "dogs", "Dogs").await;

    let (_, body) = c.get(&format!("/v1/groups/{animals}/descendants"), None).await;
    let ids: Vec<u64> = body["groups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["id"].as_u64().unwrap())
        .collect();
    // Depth-first: the pets subtree before its younger sibling.
    assert_eq!(ids, vec![pets, kittens, dogs]);
}

#[tokio::test]
async fn hidden_groups_are_pruned_for_outsiders() {
    let c = node(EngineConfig::default()).await;
    let (animals, pets, _) = animals(&c).await;
    let (status, _) = c
        .patch(&format!("/v1/groups/{pets}"), Some(SITE_ADMIN), json!({ "status": "hidden" }))
        .await;
    assert_eq!(status, 200);

    // The hidden group and its subtree disappear for outsiders.
    let (_, body) = c.get(&format!("/v1/groups/{animals}/descendants"), Some(OUTSIDER)).await;
    assert_eq!(body["groups"], json!([]));
    let (_, body) = c.get(&format!("/v1/groups/{animals}/descendants"), Some(SITE_ADMIN)).await;
    assert_eq!(body["groups"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn reparent_is_visible_immediately() {
    let c = node(EngineConfig::default()).await;
    let (animals, pets, kittens) = animals(&c).await;
    let plants = c.create_group(SITE_ADMIN, None, "plants", "Plants").await;

    let (_, body) = c.get(&format!("/v1/groups/{kittens}/ancestors"), None).await;
    assert_eq!(body["ancestors"], json!([pets, animals]));

    let (status, _) = c
        .patch(&format!("/v1/groups/{pets}"), Some(SITE_ADMIN), json!({ "parent_id": plants }))
        .await;
    assert_eq!(status, 200);

    let (_, body) = c.get(&format!("/v1/groups/{kittens}/ancestors"), None).await;
    assert_eq!(body["ancestors"], json!([pets, plants]));
    let (_, body) = c.get(&format!("/v1/groups/{kittens}/permalink"), None).await;
    assert_eq!(body["slug"], "plants/pets/kittens");
}

// ---------------------------------------------------------------------------
// Activity aggregation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn from_parents_scope_covers_ancestors() {
    let c = node(EngineConfig {
        activity_enforcement: ActivityEnforcement::SiteAdmins,
        ..Default::default()
    })
    .await;
    let (animals, pets, kittens) = animals(&c).await;

    let (status, _) = c
        .put(
            &format!("/v1/groups/{kittens}/settings"),
            Some(SITE_ADMIN),
            json!({ "include_activity": "include-from-parents" }),
        )
        .await;
    assert_eq!(status, 200);

    let (_, body) = c.get(&format!("/v1/groups/{kittens}/activity-scope"), Some(SITE_ADMIN)).await;
    assert_eq!(body["scope"], json!([kittens, pets, animals]));
    assert_eq!(body["aggregated"], true);
}

#[tokio::test]
async fn from_none_scope_is_group_only() {
    let c = node(EngineConfig {
        activity_enforcement: ActivityEnforcement::SiteAdmins,
        ..Default::default()
    })
    .await;
    let (_, _, kittens) = animals(&c).await;

    let (_, body) = c.get(&format!("/v1/groups/{kittens}/activity-scope"), Some(SITE_ADMIN)).await;
    assert_eq!(body["scope"], json!([kittens]));
    assert_eq!(body["aggregated"], false);
}

#[tokio::test]
async fn strict_enforcement_denies_site_admins() {
    let c = node(EngineConfig::default()).await;
    let (_, _, kittens) = animals(&c).await;

    let (_, perms) = c.get(&format!("/v1/groups/{kittens}/permissions"), Some(SITE_ADMIN)).await;
    assert_eq!(perms["can_include_aggregated_activity"], false);

    let (status, body) = c
        .put(
            &format!("/v1/groups/{kittens}/settings"),
            Some(SITE_ADMIN),
            json!({ "include_activity": "include-from-both" }),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["code"], "forbidden");
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[tokio::test]
async fn directory_tree_and_search() {
    let c = node(EngineConfig::default()).await;
    let (animals, pets, _) = animals(&c).await;

    let (_, body) = c.get("/v1/groups", None).await;
    assert_eq!(body["flat"], false);
    assert_eq!(body["groups"][0]["group"]["id"], animals);

    let (_, body) = c.get(&format!("/v1/groups?parent={animals}"), None).await;
    assert_eq!(body["parent_id"], animals);
    assert_eq!(body["groups"][0]["group"]["id"], pets);

    let (_, body) = c.get("/v1/groups?search=kit", None).await;
    assert_eq!(body["flat"], true);
    assert_eq!(body["groups"][0]["group"]["slug"], "kittens");
}

// ---------------------------------------------------------------------------
// Shared cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_nodes_share_invalidation() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("groups.db");
    let db = db.to_str().unwrap();

    let a = Client::new(spawn_sqlite_node(EngineConfig::default(), db).await);
    let b = Client::new(spawn_sqlite_node(EngineConfig::default(), db).await);

    let (animals, pets, kittens) = animals(&a).await;
    let plants = a.create_group(SITE_ADMIN, None, "plants", "Plants").await;

    // Warm node B's view of the hierarchy.
    let (_, body) = b.get(&format!("/v1/groups/{kittens}/ancestors"), None).await;
    assert_eq!(body["ancestors"], json!([pets, animals]));

    // Move through node A; node B must not serve the stale chain.
    let (status, _) = a
        .patch(&format!("/v1/groups/{pets}"), Some(SITE_ADMIN), json!({ "parent_id": plants }))
        .await;
    assert_eq!(status, 200);

    let (_, body) = b.get(&format!("/v1/groups/{kittens}/ancestors"), None).await;
    assert_eq!(body["ancestors"], json!([pets, plants]));
}
