//! Provider access: client cache, credential refresh, throttling, status
//! and outputs.

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::{
    application::{
        ApplicationError,
        ports::{CloudFormation, ProviderError, ProviderErrorKind},
    },
    domain::{StackId, StackStatus},
    error::StrataResult,
};

use super::Engine;

/// Width of the logical id column in stack error messages.
const EVENT_COL: usize = 20;

impl Engine {
    /// Run `op` against the stack's client with its provider name.
    ///
    /// Expired credentials drop the cached client and force a new session;
    /// throttling sleeps and retries. Both retry without bound. Every other
    /// provider error is handed back to the caller.
    pub(super) fn call<T>(
        &mut self,
        stack: StackId,
        mut op: impl FnMut(&dyn CloudFormation, &str) -> Result<T, ProviderError>,
    ) -> StrataResult<Result<T, ProviderError>> {
        loop {
            let (account, region, name) = {
                let s = self.stack(stack)?;
                (s.account.clone(), s.region.clone(), s.name().to_string())
            };
            let client = self.client(&account, &region)?;
            match op(client.as_ref(), &name) {
                Err(e) if e.kind() == ProviderErrorKind::ExpiredToken => {
                    self.handle_token_expired(stack)?;
                }
                Err(e) if e.kind() == ProviderErrorKind::RateExceeded => {
                    warn!(stack = %name, "Provider call throttled");
                    self.log_action(stack, "Provision", "Warning", Some("Provider call throttled"))?;
                    thread::sleep(self.options.throttle_delay);
                }
                other => return Ok(other),
            }
        }
    }

    /// Refresh the stack's status from the provider.
    ///
    /// A "does not exist" validation error sets `DOES_NOT_EXIST`.
    pub(super) fn get_status(&mut self, stack: StackId) -> StrataResult<StackStatus> {
        let result = self.call(stack, |cf, name| cf.describe_stack(name))?;
        let status = match result {
            Ok(description) => {
                let s = self.stack_mut(stack)?;
                s.status = description.status;
                s.stack_id = Some(description.stack_id);
                s.live_termination_protection = Some(description.termination_protection);
                description.status
            }
            Err(e) if e.kind() == ProviderErrorKind::DoesNotExist => {
                let s = self.stack_mut(stack)?;
                s.status = StackStatus::DoesNotExist;
                s.live_termination_protection = None;
                StackStatus::DoesNotExist
            }
            Err(e) => {
                let message = self.stack_error_message(stack, &format!("{}\n", e.message), true)?;
                return Err(self.provider_error(stack, message)?);
            }
        };
        debug!(stack = %stack, %status, "Status");
        Ok(status)
    }

    /// Value of one of the stack's live outputs. Values are cached for the
    /// rest of the run.
    pub(super) fn get_outputs_value(&mut self, stack: StackId, key: &str) -> StrataResult<String> {
        if let Some(value) = self.stack(stack)?.outputs_value_cache.get(key) {
            return Ok(value.clone());
        }

        let description = match self.call(stack, |cf, name| cf.describe_stack(name))? {
            Ok(description) => description,
            Err(e) if e.kind() == ProviderErrorKind::DoesNotExist => {
                let mut message = self.stack_error_message(stack, "", false)?;
                let account = self.stack(stack)?.account.clone();
                message.push_str(&format!(
                    "Could not describe stack to get value for Outputs Key: {key}\nAccount: {account}"
                ));
                return Err(ApplicationError::StackDoesNotExist {
                    stack: self.stack(stack)?.name().to_string(),
                    message,
                }
                .into());
            }
            Err(e) => return Err(self.provider_error(stack, e.message)?),
        };

        let Some(outputs) = description.outputs else {
            let mut message = self.stack_error_message(stack, "", false)?;
            message.push_str(&format!("\nKey: {key}\n"));
            return Err(ApplicationError::StackOutputMissing {
                stack: self.stack(stack)?.name().to_string(),
                key: key.to_string(),
                message,
            }
            .into());
        };

        let s = self.stack_mut(stack)?;
        for output in &outputs {
            s.outputs_value_cache
                .insert(output.key.clone(), output.value.clone());
        }
        if let Some(value) = s.outputs_value_cache.get(key) {
            return Ok(value.clone());
        }

        let mut message = self.stack_error_message(stack, "", false)?;
        message.push_str(&format!("Could not find Stack Output {key}\n"));
        Err(ApplicationError::StackOutputMissing {
            stack: self.stack(stack)?.name().to_string(),
            key: key.to_string(),
            message,
        }
        .into())
    }

    /// Assemble the stack error report: name, template, status and the
    /// failed resource events.
    pub(super) fn stack_error_message(
        &mut self,
        stack: StackId,
        prefix: &str,
        skip_status: bool,
    ) -> StrataResult<String> {
        if !skip_status {
            self.get_status(stack)?;
        }
        let (name, template, status) = {
            let s = self.stack(stack)?;
            let path = self
                .layout
                .build_template(&s.account, &s.region, &s.file_stem());
            (s.name().to_string(), path, s.status)
        };

        let mut message = format!("\n{prefix}");
        message.push_str(&format!("Stack:         {name}\n"));
        message.push_str(&format!("Template:      {}\n", template.display()));
        message.push_str(&format!("Stack Status:  {status}\n"));
        if !status.is_exists() {
            return Ok(message);
        }

        let pad = " ".repeat(EVENT_COL - "LogicalId ".len());
        message.push_str("Status Reasons:\n");
        message.push_str(&format!("LogicalId {pad}  Status Reason\n"));
        message.push_str(&format!("--------- {pad}  -------------\n"));

        match self.call(stack, |cf, name| cf.describe_stack_events(name))? {
            Ok(events) => {
                for event in events
                    .iter()
                    .filter(|e| e.resource_status.contains("FAILED"))
                {
                    let id: String = event.logical_resource_id.chars().take(EVENT_COL).collect();
                    let spaces = EVENT_COL.saturating_sub(event.logical_resource_id.len());
                    message.push_str(&format!(
                        "{id} {} {}\n",
                        " ".repeat(spaces),
                        event.resource_status_reason
                    ));
                }
            }
            Err(e) => {
                warn!(stack = %name, error = %e, "Could not describe stack events");
            }
        }
        Ok(message)
    }

    // ----- Internal Helpers -----

    pub(super) fn client(
        &mut self,
        account: &str,
        region: &str,
    ) -> StrataResult<Arc<dyn CloudFormation>> {
        let key = (account.to_string(), region.to_string());
        if let Some(client) = self.clients.get(&key) {
            return Ok(Arc::clone(client));
        }
        let force = self.expired.remove(&key);
        let client = self.sessions.client(account, region, force)?;
        self.clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    /// Drop the cached client so the next call forces a new session.
    pub(super) fn handle_token_expired(&mut self, stack: StackId) -> StrataResult<()> {
        let key = {
            let s = self.stack(stack)?;
            (s.account.clone(), s.region.clone())
        };
        warn!(account = %key.0, region = %key.1, "Credentials expired, refreshing session");
        self.clients.remove(&key);
        self.expired.insert(key);
        self.log_action(stack, "Token", "Retry", Some("Expired"))
    }

    pub(super) fn provider_error(
        &self,
        stack: StackId,
        message: String,
    ) -> StrataResult<crate::error::StrataError> {
        Ok(ApplicationError::Provider {
            stack: self.stack(stack)?.name().to_string(),
            message,
        }
        .into())
    }
}
