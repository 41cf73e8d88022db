//! Per-invocation call context.
//!
//! One [`CallContext`] exists per intercepted invocation. It is created at
//! enter, populated incrementally through exit, and discarded once the
//! after-hook returns. It is never shared between invocations and never
//! crosses execution units.

use std::any::Any;
use std::fmt;
use std::time::{Duration, Instant};

use crate::trace::Span;

/// Identity of an intercepted operation.
///
/// The qualified name doubles as the interceptor identity in the registry:
/// there is at most one live interceptor instance per operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    name: String,
    signature: Option<String>,
}

impl OperationId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: None,
        }
    }

    pub fn with_signature(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: Some(signature.into()),
        }
    }

    /// Qualified operation name, e.g. `shop::OrderService::place_order`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signature {
            Some(sig) => write!(f, "{}({})", self.name, sig),
            None => f.write_str(&self.name),
        }
    }
}

/// Error raised by the real call, as observed by the weaving mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    type_name: String,
    message: String,
}

impl CallError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// Mutable record carrying one invocation's state between enter and exit.
///
/// The argument list is deliberately re-readable by the weaving mechanism
/// after `on_enter` returns, because a before-hook may have replaced
/// elements in place. Likewise the return slot after `on_exit`.
pub struct CallContext {
    operation: OperationId,
    receiver: Option<Box<dyn Any>>,
    args: Vec<Box<dyn Any>>,
    return_value: Option<Box<dyn Any>>,
    error: Option<CallError>,
    entered_at: Instant,
    elapsed: Option<Duration>,
    user_state: Option<Box<dyn Any>>,
    span: Option<Span>,
}

impl CallContext {
    pub fn new(
        operation: OperationId,
        receiver: Option<Box<dyn Any>>,
        args: Vec<Box<dyn Any>>,
    ) -> Self {
        Self {
            operation,
            receiver,
            args,
            return_value: None,
            error: None,
            entered_at: Instant::now(),
            elapsed: None,
            user_state: None,
            span: None,
        }
    }

    pub fn operation(&self) -> &OperationId {
        &self.operation
    }

    /// Receiver of the intercepted call; `None` for static/free calls.
    pub fn receiver(&self) -> Option<&dyn Any> {
        self.receiver.as_deref()
    }

    pub fn receiver_as<T: 'static>(&self) -> Option<&T> {
        self.receiver.as_deref().and_then(|r| r.downcast_ref())
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Typed view of one argument.
    pub fn arg<T: 'static>(&self, index: usize) -> Option<&T> {
        self.args.get(index).and_then(|a| a.downcast_ref())
    }

    /// Rewrite one argument before the real call runs. Returns the
    /// previous value, or the replacement itself if the index is out of
    /// bounds (the argument list never grows).
    pub fn replace_arg(&mut self, index: usize, value: Box<dyn Any>) -> Box<dyn Any> {
        match self.args.get_mut(index) {
            Some(slot) => std::mem::replace(slot, value),
            None => value,
        }
    }

    pub fn args(&self) -> &[Box<dyn Any>] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut [Box<dyn Any>] {
        &mut self.args
    }

    /// Return-value slot. Unset until exit, unless an interceptor fills it.
    pub fn return_value(&self) -> Option<&dyn Any> {
        self.return_value.as_deref()
    }

    pub fn return_value_as<T: 'static>(&self) -> Option<&T> {
        self.return_value.as_deref().and_then(|v| v.downcast_ref())
    }

    /// Overwrite the return value the caller will observe.
    pub fn set_return_value(&mut self, value: Box<dyn Any>) {
        self.return_value = Some(value);
    }

    pub fn take_return_value(&mut self) -> Option<Box<dyn Any>> {
        self.return_value.take()
    }

    pub fn error(&self) -> Option<&CallError> {
        self.error.as_ref()
    }

    pub(crate) fn set_error(&mut self, error: Option<CallError>) {
        self.error = error;
    }

    /// Monotonic instant captured when the context was created.
    pub fn entered_at(&self) -> Instant {
        self.entered_at
    }

    /// Wall time between enter and exit. `None` until exit.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub(crate) fn record_elapsed(&mut self) {
        self.elapsed = Some(self.entered_at.elapsed());
    }

    /// Interceptor-private state carried from the before-hook to the
    /// after-hook of the same invocation.
    pub fn set_user_state(&mut self, state: Box<dyn Any>) {
        self.user_state = Some(state);
    }

    pub fn user_state<T: 'static>(&self) -> Option<&T> {
        self.user_state.as_deref().and_then(|s| s.downcast_ref())
    }

    pub fn user_state_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.user_state.as_deref_mut().and_then(|s| s.downcast_mut())
    }

    pub fn take_user_state(&mut self) -> Option<Box<dyn Any>> {
        self.user_state.take()
    }

    /// Trace span attached to this invocation, if the interceptor opened one.
    pub fn attach_span(&mut self, span: Span) {
        self.span = Some(span);
    }

    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }

    pub fn take_span(&mut self) -> Option<Span> {
        self.span.take()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("operation", &self.operation)
            .field("args", &self.args.len())
            .field("has_return", &self.return_value.is_some())
            .field("error", &self.error)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

/// Context handed to construct interceptors at the end of an object's
/// construction. Unlike [`CallContext`] the receiver is borrowed, because
/// construct interceptors exist to mutate the freshly built instance.
pub struct ConstructContext<'a> {
    operation: &'a OperationId,
    receiver: &'a mut dyn Any,
    args: &'a mut [Box<dyn Any>],
}

impl<'a> ConstructContext<'a> {
    pub fn new(
        operation: &'a OperationId,
        receiver: &'a mut dyn Any,
        args: &'a mut [Box<dyn Any>],
    ) -> Self {
        Self {
            operation,
            receiver,
            args,
        }
    }

    pub fn operation(&self) -> &OperationId {
        self.operation
    }

    pub fn receiver(&self) -> &dyn Any {
        self.receiver
    }

    pub fn receiver_mut(&mut self) -> &mut dyn Any {
        self.receiver
    }

    pub fn receiver_as_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.receiver.downcast_mut()
    }

    pub fn arg<T: 'static>(&self, index: usize) -> Option<&T> {
        self.args.get(index).and_then(|a| a.downcast_ref())
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }
}

/// The "injected object" slot. Host types that want per-instance auxiliary
/// state attached by a construct interceptor embed one of these.
#[derive(Default)]
pub struct AttachmentSlot(Option<Box<dyn Any + Send>>);

impl AttachmentSlot {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn set(&mut self, value: Box<dyn Any + Send>) {
        self.0 = Some(value);
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.0.as_deref_mut().and_then(|v| v.downcast_mut())
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

impl fmt::Debug for AttachmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttachmentSlot").field(&self.is_set()).finish()
    }
}
