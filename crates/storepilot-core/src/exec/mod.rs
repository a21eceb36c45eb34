//! Remote command execution against tenant workers
//!
//! Wraps the cluster CLI (`kubectl`) with context resolution, per-attempt
//! timeouts and exponential-backoff retry on transient failures.

pub mod kubectl;
pub mod retry;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use kubectl::{CliInvocation, ExecError, KubeConfig, KubeCtl};
pub use retry::{with_retry, IsRetryable, RetryConfig};
pub use runner::{CommandOutput, CommandRunner, RunOutcome, TokioRunner};
