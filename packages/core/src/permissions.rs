//! Delegated permission decisions.
//!
//! Two independent checks:
//!
//! - [`PermissionResolver::can_create_subgroup`]: governed by the target
//!   group's own [`SubgroupCreators`] policy. Rights on a parent never
//!   propagate to its children.
//! - [`PermissionResolver::can_include_aggregated_activity`]: governed by the
//!   process-wide [`ActivityEnforcement`] policy.
//!
//! Both are read-only and fail closed: missing groups, anonymous users, and
//! unrecognised stored policies all deny.

use std::sync::Arc;

use crate::store::{GroupStore, Membership, StoreError};
use crate::types::{
    ActivityEnforcement, GroupId, SubgroupCreators, UserId, ANONYMOUS, SUBGROUP_CREATORS_META_KEY,
};

#[derive(Clone)]
pub struct PermissionResolver {
    groups: Arc<dyn GroupStore>,
    members: Arc<dyn Membership>,
    restrict_group_creation: bool,
    activity_enforcement: ActivityEnforcement,
}

impl PermissionResolver {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        members: Arc<dyn Membership>,
        restrict_group_creation: bool,
        activity_enforcement: ActivityEnforcement,
    ) -> Self {
        Self {
            groups,
            members,
            restrict_group_creation,
            activity_enforcement,
        }
    }

    /// The stored subgroup creation policy of `group_id`.
    pub fn subgroup_creators(&self, group_id: GroupId) -> Result<SubgroupCreators, StoreError> {
        let raw = self
            .groups
            .get_group_meta(group_id, SUBGROUP_CREATORS_META_KEY)?;
        Ok(SubgroupCreators::from_setting(raw.as_deref()))
    }

    /// May `user_id` create a subgroup directly under `group_id`?
    ///
    /// When site-wide group creation is restricted, only site administrators
    /// pass. Otherwise the group's policy decides; `noone` still lets site
    /// administrators through.
    pub fn can_create_subgroup(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        if user_id == ANONYMOUS {
            return Ok(false);
        }
        let site_admin = self.members.is_site_admin(user_id)?;
        if self.restrict_group_creation && !site_admin {
            return Ok(false);
        }
        if self.groups.get_group(group_id)?.is_none() {
            return Ok(false);
        }

        let allowed = match self.subgroup_creators(group_id)? {
            SubgroupCreators::Admin => self.members.is_admin(user_id, group_id)?,
            SubgroupCreators::Mod => {
                self.members.is_mod(user_id, group_id)? || self.members.is_admin(user_id, group_id)?
            }
            SubgroupCreators::Member => self.members.is_member(user_id, group_id)?,
            SubgroupCreators::Noone => site_admin,
        };
        tracing::debug!(user_id, group_id, allowed, "subgroup creation check");
        Ok(allowed)
    }

    /// May `user_id` widen the activity stream of `group_id` beyond the group itself?
    pub fn can_include_aggregated_activity(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<bool, StoreError> {
        if user_id == ANONYMOUS {
            return Ok(false);
        }
        match self.activity_enforcement {
            ActivityEnforcement::SiteAdmins => self.members.is_site_admin(user_id),
            ActivityEnforcement::GroupAdmins => Ok(self.members.is_site_admin(user_id)?
                || self.members.is_admin(user_id, group_id)?),
            ActivityEnforcement::Strict => Ok(false),
        }
    }

    /// May `user_id` create a top-level group?
    pub fn can_create_group(&self, user_id: UserId) -> Result<bool, StoreError> {
        if user_id == ANONYMOUS {
            return Ok(false);
        }
        if self.restrict_group_creation {
            return self.members.is_site_admin(user_id);
        }
        Ok(true)
    }

    /// May `user_id` change the settings of `group_id`?
    pub fn can_manage_group(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        if user_id == ANONYMOUS {
            return Ok(false);
        }
        Ok(self.members.is_site_admin(user_id)? || self.members.is_admin(user_id, group_id)?)
    }
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("restrict_group_creation", &self.restrict_group_creation)
            .field("activity_enforcement", &self.activity_enforcement)
            .finish_non_exhaustive()
    }
}
