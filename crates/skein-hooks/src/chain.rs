// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered, immutable hook chain with priority-based failure handling.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use skein_core::SkeinError;
use strum::{Display, EnumString};
use tracing::{debug, error, warn};

use crate::context::{AfterResponse, BeforeRequest, RequestContext, ResponseContext};

/// How a hook's failure affects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HookPriority {
    /// Failure is logged and the chain continues.
    Observational,
    /// Failure before a request aborts that request.
    Critical,
}

/// Which side of the attempt a hook ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HookPhase {
    BeforeRequest,
    AfterResponse,
}

/// A hook's capability set.
#[derive(Clone)]
pub enum Hook {
    BeforeRequest(Arc<dyn BeforeRequest>),
    AfterResponse(Arc<dyn AfterResponse>),
    Both(Arc<dyn BeforeRequest>, Arc<dyn AfterResponse>),
}

impl Hook {
    pub fn before<H: BeforeRequest + 'static>(hook: H) -> Self {
        Self::BeforeRequest(Arc::new(hook))
    }

    pub fn after<H: AfterResponse + 'static>(hook: H) -> Self {
        Self::AfterResponse(Arc::new(hook))
    }

    /// Registers one value for both sides of the attempt.
    pub fn both<H: BeforeRequest + AfterResponse + 'static>(hook: H) -> Self {
        let hook = Arc::new(hook);
        Self::Both(hook.clone(), hook)
    }

    fn before_request(&self) -> Option<&dyn BeforeRequest> {
        match self {
            Self::BeforeRequest(h) | Self::Both(h, _) => Some(h.as_ref()),
            Self::AfterResponse(_) => None,
        }
    }

    fn after_response(&self) -> Option<&dyn AfterResponse> {
        match self {
            Self::AfterResponse(h) | Self::Both(_, h) => Some(h.as_ref()),
            Self::BeforeRequest(_) => None,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::BeforeRequest(_) => "BeforeRequest",
            Self::AfterResponse(_) => "AfterResponse",
            Self::Both(..) => "Both",
        };
        f.write_str(kind)
    }
}

/// A hook failure passed to the chain's failure observer.
#[derive(Debug, Clone)]
pub struct HookFailure {
    pub hook: String,
    pub priority: HookPriority,
    pub phase: HookPhase,
    pub error: SkeinError,
    pub panicked: bool,
}

/// Called for every hook failure, including contained panics.
pub type FailureCallback = Arc<dyn Fn(&HookFailure) + Send + Sync>;

/// Counters for one registered hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStats {
    pub name: String,
    pub priority: HookPriority,
    pub invocations: u64,
    pub failures: u64,
    pub panics: u64,
}

struct RegisteredHook {
    name: String,
    priority: HookPriority,
    hook: Hook,
    invocations: AtomicU64,
    failures: AtomicU64,
    panics: AtomicU64,
}

/// Builds a [`HookChain`]. Registration order is preserved.
#[derive(Default)]
pub struct HookChainBuilder {
    hooks: Vec<(String, Hook, HookPriority)>,
    on_failure: Option<FailureCallback>,
}

impl HookChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hook(mut self, name: impl Into<String>, hook: Hook, priority: HookPriority) -> Self {
        self.hooks.push((name.into(), hook, priority));
        self
    }

    pub fn on_failure(mut self, callback: FailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }

    /// Finalizes the chain. Hook names must be non-empty and unique.
    pub fn build(self) -> Result<HookChain, SkeinError> {
        let mut seen = HashSet::new();
        let mut hooks = Vec::with_capacity(self.hooks.len());
        for (name, hook, priority) in self.hooks {
            if name.trim().is_empty() {
                return Err(SkeinError::invalid_field("hook.name", "hook name must not be empty"));
            }
            if !seen.insert(name.clone()) {
                return Err(SkeinError::invalid_field(
                    "hook.name",
                    format!("duplicate hook name `{name}`"),
                ));
            }
            hooks.push(RegisteredHook {
                name,
                priority,
                hook,
                invocations: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                panics: AtomicU64::new(0),
            });
        }
        Ok(HookChain {
            hooks,
            on_failure: self.on_failure,
        })
    }
}

/// Immutable chain of classified hooks.
///
/// Before-request hooks run in registration order; after-response hooks run
/// in reverse registration order.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<RegisteredHook>,
    on_failure: Option<FailureCallback>,
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| (&h.name, h.priority, &h.hook)))
            .finish()
    }
}

impl HookChain {
    /// A chain with no hooks.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> HookChainBuilder {
        HookChainBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name.as_str()).collect()
    }

    /// Runs before-request hooks in order.
    ///
    /// Returns a [`SkeinError::Hook`] as soon as a critical hook fails; the
    /// remaining hooks are not run.
    pub async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), SkeinError> {
        for registered in &self.hooks {
            let Some(hook) = registered.hook.before_request() else {
                continue;
            };
            registered.invocations.fetch_add(1, Ordering::Relaxed);

            let Err((cause, panicked)) = guarded(&registered.name, hook.before_request(ctx)).await
            else {
                continue;
            };

            let err = self.record_failure(registered, HookPhase::BeforeRequest, cause, panicked);
            if registered.priority == HookPriority::Critical {
                error!(
                    hook = %registered.name,
                    batch_id = %ctx.batch_id,
                    error = %err,
                    "critical hook failed, aborting request"
                );
                return Err(err);
            }
            warn!(
                hook = %registered.name,
                batch_id = %ctx.batch_id,
                error = %err,
                "observational hook failed, continuing"
            );
        }
        Ok(())
    }

    /// Runs after-response hooks in reverse order. Failures are logged only.
    pub async fn after_response(&self, ctx: &ResponseContext) {
        for registered in self.hooks.iter().rev() {
            let Some(hook) = registered.hook.after_response() else {
                continue;
            };
            registered.invocations.fetch_add(1, Ordering::Relaxed);

            if let Err((cause, panicked)) =
                guarded(&registered.name, hook.after_response(ctx)).await
            {
                let err =
                    self.record_failure(registered, HookPhase::AfterResponse, cause, panicked);
                warn!(
                    hook = %registered.name,
                    batch_id = %ctx.batch_id,
                    error = %err,
                    "after-response hook failed"
                );
            }
        }
    }

    pub fn stats(&self) -> Vec<HookStats> {
        self.hooks
            .iter()
            .map(|h| HookStats {
                name: h.name.clone(),
                priority: h.priority,
                invocations: h.invocations.load(Ordering::Relaxed),
                failures: h.failures.load(Ordering::Relaxed),
                panics: h.panics.load(Ordering::Relaxed),
            })
            .collect()
    }

    fn record_failure(
        &self,
        registered: &RegisteredHook,
        phase: HookPhase,
        cause: SkeinError,
        panicked: bool,
    ) -> SkeinError {
        registered.failures.fetch_add(1, Ordering::Relaxed);
        if panicked {
            registered.panics.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!(
            "skein_hook_failures_total",
            "hook" => registered.name.clone(),
            "phase" => phase.to_string()
        )
        .increment(1);

        let err = match cause {
            SkeinError::Hook { .. } => cause,
            other => SkeinError::Hook {
                name: registered.name.clone(),
                message: other.to_string(),
            },
        };

        if let Some(callback) = &self.on_failure {
            let failure = HookFailure {
                hook: registered.name.clone(),
                priority: registered.priority,
                phase,
                error: err.clone(),
                panicked,
            };
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(&failure))).is_err() {
                error!(hook = %registered.name, "hook failure observer panicked");
            }
        }
        err
    }
}

/// Awaits a hook future, converting a panic into an error.
///
/// The boolean is `true` when the failure was a panic.
async fn guarded<F>(name: &str, fut: F) -> Result<(), (SkeinError, bool)>
where
    F: Future<Output = Result<(), SkeinError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err((err, false)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!(hook = %name, panic = %message, "contained hook panic");
            Err((
                SkeinError::Hook {
                    name: name.to_string(),
                    message: format!("panicked: {message}"),
                },
                true,
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
