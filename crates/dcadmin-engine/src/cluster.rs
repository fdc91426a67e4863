//! Pod lookup through the cluster control plane

use crate::exec::Executor;
use dcadmin_core::config::ClusterConfig;
use dcadmin_core::errors::{AdminError, Result};
use dcadmin_core::model::WorkloadRole;

/// Resolves workload roles to running pod names
///
/// Always picks the first pod the selector matches. That is fine for the
/// single-replica data services this tool targets and wrong for anything
/// replicated.
pub struct ClusterLocator<'a> {
    executor: &'a dyn Executor,
    config: &'a ClusterConfig,
}

impl<'a> ClusterLocator<'a> {
    pub fn new(executor: &'a dyn Executor, config: &'a ClusterConfig) -> Self {
        Self { executor, config }
    }

    /// Name of the first pod running `role`
    ///
    /// # Errors
    ///
    /// Propagates the `kubectl` failure when nothing matches (kubectl rejects
    /// the out-of-range index), and returns `NoInstance` if kubectl succeeds
    /// with empty output.
    pub fn locate(&self, role: WorkloadRole) -> Result<String> {
        let selector = self.config.selector_for(role);
        let out = self.executor.run(&locate_command(selector))?;
        let pod = String::from_utf8_lossy(&out).trim().to_string();
        if pod.is_empty() {
            return Err(AdminError::NoInstance {
                selector: selector.to_string(),
            }
            .into());
        }
        tracing::info!(role = %role, pod = %pod, "located instance");
        Ok(pod)
    }

    /// The kubectl context the commands will run against
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` if kubectl has no current context.
    pub fn current_context(&self) -> Result<String> {
        let out = self.executor.run("kubectl config current-context")?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }
}

/// `kubectl` invocation printing the first pod matching `selector`
pub fn locate_command(selector: &str) -> String {
    format!(
        "kubectl get pods -l {} -o jsonpath={{.items[0].metadata.name}}",
        selector
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_command() {
        assert_eq!(
            locate_command("app=pgsql"),
            "kubectl get pods -l app=pgsql -o jsonpath={.items[0].metadata.name}"
        );
    }
}
