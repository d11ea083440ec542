//! Group passes: validate, provision and delete walk the group tree in
//! order, gating each stack by the group filter.

use tracing::{info, instrument, warn};

use crate::{
    application::ApplicationError,
    domain::{GroupId, GroupState, Member, StackId, StackOrder},
    error::StrataResult,
};

use super::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Validate,
    Provision,
    Delete,
}

impl Pass {
    fn verb(self) -> &'static str {
        match self {
            Self::Validate => "Validate",
            Self::Provision => "Provision",
            Self::Delete => "Delete",
        }
    }
}

impl Engine {
    // ========================================================================
    // Passes over every root group
    // ========================================================================

    /// Validate every stack registered for provisioning.
    #[instrument(skip_all, fields(roots = self.roots.len()))]
    pub fn validate(&mut self) -> StrataResult<()> {
        self.pending_header = Some("Validate");
        for root in self.roots.clone() {
            self.validate_group(root)?;
        }
        Ok(())
    }

    /// Provision every stack, then wait in WAIT and WAITLAST order.
    #[instrument(skip_all, fields(roots = self.roots.len()))]
    pub fn provision(&mut self) -> StrataResult<()> {
        self.pending_header = Some("Provision");
        for root in self.roots.clone() {
            self.provision_group(root)?;
        }
        info!("Provision complete");
        Ok(())
    }

    /// Delete every stack in reverse order after one confirmation.
    #[instrument(skip_all, fields(roots = self.roots.len()))]
    pub fn delete(&mut self) -> StrataResult<()> {
        if !self
            .confirm
            .confirm("Proceed with deletion of the selected stacks?", false)?
        {
            self.emit("Aborted run.");
            return Err(ApplicationError::UserAbort.into());
        }
        self.pending_header = Some("Delete");
        for root in self.roots.clone().into_iter().rev() {
            self.delete_group(root)?;
        }
        info!("Delete complete");
        Ok(())
    }

    // ========================================================================
    // Single group
    // ========================================================================

    pub fn validate_group(&mut self, group: GroupId) -> StrataResult<()> {
        let items = self.group(group)?.orders.clone();
        for item in items.iter().filter(|i| i.order == StackOrder::Provision) {
            match item.member {
                Member::Group(nested) => self.validate_group(nested)?,
                Member::Stack(id) => self.filtered(group, id, Pass::Validate)?,
            }
        }
        Ok(())
    }

    pub fn provision_group(&mut self, group: GroupId) -> StrataResult<()> {
        let items = self.group(group)?.orders.clone();
        let mut wait_last = Vec::new();

        for item in &items {
            match (item.order, item.member) {
                (StackOrder::Provision, Member::Group(nested)) => self.provision_group(nested)?,
                (StackOrder::Provision, Member::Stack(id)) => {
                    self.filtered(group, id, Pass::Provision)?;
                }
                (_, Member::Group(_)) => {}
                (StackOrder::Wait, Member::Stack(id)) => self.wait_unless_cached(id)?,
                (StackOrder::WaitLast, Member::Stack(id)) => wait_last.push(id),
            }
        }
        for id in wait_last {
            self.wait_unless_cached(id)?;
        }

        self.update_group_state(group)
    }

    pub fn delete_group(&mut self, group: GroupId) -> StrataResult<()> {
        let items = self.group(group)?.orders.clone();

        for item in items
            .iter()
            .rev()
            .filter(|i| i.order == StackOrder::Provision)
        {
            match item.member {
                Member::Group(nested) => self.delete_group(nested)?,
                Member::Stack(id) => self.filtered(group, id, Pass::Delete)?,
            }
        }
        for item in items.iter().rev().filter(|i| i.order == StackOrder::Wait) {
            if let Member::Stack(id) = item.member {
                self.wait_for_complete(id)?;
            }
        }
        Ok(())
    }

    // ----- Internal Helpers -----

    /// Run `pass` on the stack if the group filter admits it.
    fn filtered(&mut self, group: GroupId, id: StackId, pass: Pass) -> StrataResult<()> {
        let allowed = {
            let s = self.stack(id)?;
            self.group(group)?
                .allows(&s.template.config_ref, s.singleton)
        };
        if !allowed {
            return self.log_action(id, pass.verb(), "Filtered", None);
        }
        match pass {
            Pass::Validate => self.validate_stack(id),
            Pass::Provision => self.provision_stack(id),
            Pass::Delete => self.delete_applied_stack(id),
        }
    }

    fn wait_unless_cached(&mut self, id: StackId) -> StrataResult<()> {
        if self.stack(id)?.cached {
            return Ok(());
        }
        self.wait_for_complete(id)
    }

    /// Rewrite the group state file and report stacks that dropped out of
    /// the group since the last run. Nothing is deleted.
    fn update_group_state(&mut self, group: GroupId) -> StrataResult<()> {
        let (path, members) = {
            let g = self.group(group)?;
            (self.layout.group_state(&g.state_file_name()), g.members.clone())
        };

        let previous = match self.fs.read_to_string(&path)? {
            Some(text) => serde_yaml::from_str::<Option<GroupState>>(&text)
                .map_err(|e| ApplicationError::Serialization {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
                .unwrap_or_default(),
            None => GroupState::default(),
        };

        let mut current = GroupState::default();
        for member in members {
            if let Member::Stack(id) = member {
                let s = self.stack(id)?;
                current.push(s.name(), &s.account, &s.region);
            }
        }

        let removed = previous.removed_since(&current);
        if !removed.is_empty() {
            warn!(group = %group, count = removed.len(), "Stacks no longer in group");
            self.emit("The following Stacks are no longer needed:");
            self.emit("");
            for (account, region, name) in removed {
                self.emit(&format!("   - {account}.{region}: {name}"));
            }
        }

        let text = serde_yaml::to_string(&current).map_err(|e| ApplicationError::Serialization {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.fs.write_file(&path, &text)
    }
}
