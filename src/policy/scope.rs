//! Resource scope evaluation
//!
//! A granted permission may be limited to the caller's own resources or to
//! their teams' resources. Scopes collected from several grants are unioned:
//! holding `tickets.edit` as `own` through one role and `all` through
//! another behaves as `all`.

use crate::domain::{ResourcePattern, StringUuid, UserContext};
use serde::{Deserialize, Serialize};

/// Union of the resource patterns a permission was granted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeSet {
    all: bool,
    own: bool,
    team: bool,
    unscoped: bool,
}

impl ScopeSet {
    pub fn of(pattern: ResourcePattern) -> Self {
        let mut scope = Self::default();
        scope.widen(pattern);
        scope
    }

    /// Add a pattern. Never removes coverage.
    pub fn widen(&mut self, pattern: ResourcePattern) {
        match pattern {
            ResourcePattern::All => self.all = true,
            ResourcePattern::Own => self.own = true,
            ResourcePattern::Team => self.team = true,
            ResourcePattern::None => self.unscoped = true,
        }
    }

    pub fn union(mut self, other: ScopeSet) -> Self {
        self.all |= other.all;
        self.own |= other.own;
        self.team |= other.team;
        self.unscoped |= other.unscoped;
        self
    }

    pub fn is_empty(&self) -> bool {
        !(self.all || self.own || self.team || self.unscoped)
    }

    /// Covers every instance, either through `all` or because scope does
    /// not apply to the permission.
    pub fn is_unrestricted(&self) -> bool {
        self.all || self.unscoped
    }

    pub fn patterns(&self) -> Vec<ResourcePattern> {
        [
            (self.all, ResourcePattern::All),
            (self.own, ResourcePattern::Own),
            (self.team, ResourcePattern::Team),
            (self.unscoped, ResourcePattern::None),
        ]
        .into_iter()
        .filter_map(|(held, pattern)| held.then_some(pattern))
        .collect()
    }

    /// Whether `resource` falls inside this scope for `user`.
    pub fn covers(&self, resource: &ResourceRef, user: &UserContext) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let owned = self.own && resource.owner_id == Some(user.user_id);
        let in_team = self.team && resource.team_id.is_some_and(|team| user.is_member_of(team));
        owned || in_team
    }
}

/// Ownership facts about a concrete resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRef {
    pub owner_id: Option<StringUuid>,
    pub team_id: Option<StringUuid>,
}

impl ResourceRef {
    pub fn owned_by(owner_id: StringUuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            team_id: None,
        }
    }

    pub fn in_team(team_id: StringUuid) -> Self {
        Self {
            owner_id: None,
            team_id: Some(team_id),
        }
    }

    pub fn with_team(mut self, team_id: StringUuid) -> Self {
        self.team_id = Some(team_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn user_in(team: StringUuid) -> UserContext {
        UserContext {
            user_id: StringUuid::new_v4(),
            team_ids: vec![team],
        }
    }

    #[test]
    fn test_all_covers_anything() {
        let user = user_in(StringUuid::new_v4());
        let scope = ScopeSet::of(ResourcePattern::All);
        assert!(scope.covers(&ResourceRef::default(), &user));
        assert!(scope.covers(&ResourceRef::owned_by(StringUuid::new_v4()), &user));
    }

    #[test]
    fn test_none_pattern_is_binary() {
        let user = user_in(StringUuid::new_v4());
        let scope = ScopeSet::of(ResourcePattern::None);
        assert!(scope.covers(&ResourceRef::owned_by(StringUuid::new_v4()), &user));
    }

    #[test]
    fn test_own_requires_matching_owner() {
        let user = user_in(StringUuid::new_v4());
        let scope = ScopeSet::of(ResourcePattern::Own);
        assert!(scope.covers(&ResourceRef::owned_by(user.user_id), &user));
        assert!(!scope.covers(&ResourceRef::owned_by(StringUuid::new_v4()), &user));
        assert!(!scope.covers(&ResourceRef::default(), &user));
    }

    #[test]
    fn test_team_requires_membership() {
        let team = StringUuid::new_v4();
        let user = user_in(team);
        let scope = ScopeSet::of(ResourcePattern::Team);
        assert!(scope.covers(&ResourceRef::in_team(team), &user));
        assert!(!scope.covers(&ResourceRef::in_team(StringUuid::new_v4()), &user));
        assert!(!scope.covers(&ResourceRef::owned_by(user.user_id), &user));
    }

    #[rstest]
    #[case(ResourcePattern::Own, ResourcePattern::All)]
    #[case(ResourcePattern::All, ResourcePattern::Own)]
    #[case(ResourcePattern::Team, ResourcePattern::All)]
    fn test_union_widens_to_broadest(#[case] first: ResourcePattern, #[case] second: ResourcePattern) {
        let user = user_in(StringUuid::new_v4());
        let foreign = ResourceRef::owned_by(StringUuid::new_v4());

        let scope = ScopeSet::of(first).union(ScopeSet::of(second));
        assert!(scope.is_unrestricted());
        assert!(scope.covers(&foreign, &user));
    }

    #[test]
    fn test_own_and_team_union_covers_both() {
        let team = StringUuid::new_v4();
        let user = user_in(team);
        let mut scope = ScopeSet::of(ResourcePattern::Own);
        scope.widen(ResourcePattern::Team);

        assert!(!scope.is_unrestricted());
        assert!(scope.covers(&ResourceRef::owned_by(user.user_id), &user));
        assert!(scope.covers(&ResourceRef::in_team(team), &user));
        assert!(!scope.covers(&ResourceRef::owned_by(StringUuid::new_v4()), &user));
        assert_eq!(scope.patterns(), vec![ResourcePattern::Own, ResourcePattern::Team]);
    }

    #[test]
    fn test_empty_scope_covers_nothing() {
        let user = user_in(StringUuid::new_v4());
        let scope = ScopeSet::default();
        assert!(scope.is_empty());
        assert!(!scope.covers(&ResourceRef::owned_by(user.user_id), &user));
    }
}
