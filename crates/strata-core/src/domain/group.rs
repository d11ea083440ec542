//! Stack groups and their ordering slots.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{DomainError, GroupId, StackId};

/// Scheduling slot a member is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackOrder {
    Provision,
    Wait,
    WaitLast,
}

/// A group member: a stack or a nested group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    Stack(StackId),
    Group(GroupId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderItem {
    pub order: StackOrder,
    pub member: Member,
}

/// Normalized subtree filter.
///
/// Trailing dots are trimmed from both the configured prefix and the
/// candidate so `a.b.` and `a.b` behave the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPrefix(String);

impl FilterPrefix {
    pub fn new(prefix: &str) -> Self {
        Self(prefix.trim_end_matches('.').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact match or a dotted descendant.
    pub fn matches(&self, config_ref: &str) -> bool {
        let candidate = config_ref.trim_end_matches('.');
        candidate == self.0
            || candidate
                .strip_prefix(self.0.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// An ordered, filterable collection of stacks and nested groups.
#[derive(Debug, Clone)]
pub struct StackGroup {
    pub id: GroupId,
    pub name: String,
    pub aws_name: String,
    /// AWS name of the owning controller.
    pub controller_aws_name: String,
    pub members: Vec<Member>,
    pub orders: Vec<OrderItem>,
    pub filter: Option<FilterPrefix>,
}

impl StackGroup {
    pub fn new(
        id: GroupId,
        name: impl Into<String>,
        aws_name: impl Into<String>,
        controller_aws_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            aws_name: aws_name.into(),
            controller_aws_name: controller_aws_name.into(),
            members: Vec::new(),
            orders: Vec::new(),
            filter: None,
        }
    }

    /// `<controller aws name>-<aws name>`, the prefix of every stack name.
    pub fn full_aws_name(&self) -> String {
        if self.controller_aws_name.is_empty() {
            self.aws_name.clone()
        } else {
            format!("{}-{}", self.controller_aws_name, self.aws_name)
        }
    }

    /// Register `member` under each order.
    ///
    /// An existing (member, order) item is moved to the end rather than
    /// duplicated, and the member is recorded once.
    pub fn add_member(&mut self, member: Member, orders: &[StackOrder]) -> Result<(), DomainError> {
        if member == Member::Group(self.id) {
            return Err(DomainError::GroupCycle {
                group: self.name.clone(),
            });
        }

        for &order in orders {
            let item = match self
                .orders
                .iter()
                .position(|i| i.member == member && i.order == order)
            {
                Some(pos) => self.orders.remove(pos),
                None => OrderItem { order, member },
            };
            self.orders.push(item);
        }
        if !self.members.contains(&member) {
            self.members.push(member);
        }
        Ok(())
    }

    pub fn set_filter(&mut self, prefix: Option<&str>) {
        self.filter = prefix.map(FilterPrefix::new);
    }

    /// True if a stack with `config_ref` passes the group filter.
    pub fn allows(&self, config_ref: &str, singleton: bool) -> bool {
        match &self.filter {
            Some(filter) => singleton || filter.matches(config_ref),
            None => true,
        }
    }

    /// File name of the group's state file.
    pub fn state_file_name(&self) -> String {
        format!("{}-{}-StackGroup-State.yaml", self.full_aws_name(), self.name)
    }
}

/// Persisted record of the stacks a group provisioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    #[serde(default)]
    pub stack_names: Vec<String>,
    #[serde(default)]
    pub account_names: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl GroupState {
    pub fn push(&mut self, stack_name: &str, account: &str, region: &str) {
        self.stack_names.push(stack_name.to_string());
        self.account_names.push(account.to_string());
        self.regions.push(region.to_string());
    }

    /// Entries of `self` whose stack name no longer appears in `current`,
    /// as `(account, region, stack)`.
    pub fn removed_since<'a>(&'a self, current: &GroupState) -> Vec<(&'a str, &'a str, &'a str)> {
        let live: BTreeSet<&str> = current.stack_names.iter().map(String::as_str).collect();
        self.stack_names
            .iter()
            .enumerate()
            .filter(|(_, name)| !live.contains(name.as_str()))
            .map(|(idx, name)| {
                (
                    self.account_names.get(idx).map_or("", String::as_str),
                    self.regions.get(idx).map_or("", String::as_str),
                    name.as_str(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Ordering
    // ========================================================================

    #[test]
    fn add_member_records_each_order_once() {
        let mut group = StackGroup::new(GroupId(0), "net", "net", "ne-mynet-dev");
        let s = Member::Stack(StackId(1));
        group
            .add_member(s, &[StackOrder::Provision, StackOrder::Wait])
            .unwrap();
        group.add_member(s, &[StackOrder::Provision]).unwrap();

        assert_eq!(group.members, vec![s]);
        assert_eq!(group.orders.len(), 2);
        assert_eq!(group.orders[0].order, StackOrder::Wait);
        assert_eq!(group.orders[1].order, StackOrder::Provision);
    }

    #[test]
    fn group_cannot_contain_itself() {
        let mut group = StackGroup::new(GroupId(4), "g", "g", "c");
        assert!(matches!(
            group.add_member(Member::Group(GroupId(4)), &[StackOrder::Provision]),
            Err(DomainError::GroupCycle { .. })
        ));
    }

    #[test]
    fn full_aws_name_joins_controller() {
        let group = StackGroup::new(GroupId(0), "app", "App-web", "ne-mynet-dev");
        assert_eq!(group.full_aws_name(), "ne-mynet-dev-App-web");
        assert_eq!(
            group.state_file_name(),
            "ne-mynet-dev-App-web-app-StackGroup-State.yaml"
        );
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    #[test]
    fn filter_requires_dot_boundary() {
        let f = FilterPrefix::new("foo.bar");
        assert!(f.matches("foo.bar"));
        assert!(f.matches("foo.bar.baz"));
        assert!(!f.matches("foo.barbaz"));
        assert!(!f.matches("foo"));
    }

    #[test]
    fn filter_normalizes_trailing_dots() {
        let f = FilterPrefix::new("foo.bar.");
        assert_eq!(f.as_str(), "foo.bar");
        assert!(f.matches("foo.bar"));
        assert!(f.matches("foo.bar."));
        assert!(f.matches("foo.bar.x"));
    }

    #[test]
    fn singleton_bypasses_filter() {
        let mut group = StackGroup::new(GroupId(0), "g", "g", "c");
        assert!(group.allows("anything", false));
        group.set_filter(Some("a.b"));
        assert!(!group.allows("x.y", false));
        assert!(group.allows("x.y", true));
        assert!(group.allows("a.b.c", false));
    }

    // ========================================================================
    // State
    // ========================================================================

    #[test]
    fn removed_since_reports_vanished_stacks() {
        let mut old = GroupState::default();
        old.push("a", "dev", "us-west-2");
        old.push("b", "prod", "eu-west-1");
        let mut new = GroupState::default();
        new.push("a", "dev", "us-west-2");

        assert_eq!(old.removed_since(&new), vec![("prod", "eu-west-1", "b")]);
    }
}
