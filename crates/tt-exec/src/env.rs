use async_trait::async_trait;
use serde_json::Value as Json;

use tt_compile::ErrorScope;
use tt_lang::ast::Value;

use crate::error::{ExecError, ExecResult};

/// A result row: named fields with typed values.
pub type Tuple = tt_lang::eval::Tuple;

/// Lazy sequence of tuples. `next` may suspend; `Ok(None)` ends the
/// sequence. Cancellation is propagated by failing the pending `next`.
#[async_trait]
pub trait TupleStream: Send {
    async fn next(&mut self) -> ExecResult<Option<Tuple>>;
}

/// The runtime surface compiled rules execute against. The interpreter
/// never touches devices or state directly; everything goes through here,
/// and state-slot access is serialized per slot by the implementation.
#[async_trait]
pub trait ExecEnvironment: Send {
    /// Open a change-detection stream over a monitorable query.
    async fn invoke_monitor(
        &mut self,
        function: &str,
        params: &Tuple,
    ) -> ExecResult<Box<dyn TupleStream>>;

    /// Tick stream for `timer(base, interval, frequency?)`.
    async fn invoke_timer(
        &mut self,
        base: &Value,
        interval: &Value,
        frequency: Option<&Value>,
    ) -> ExecResult<Box<dyn TupleStream>>;

    /// Tick stream for `attimer(time, expiration_date?)`.
    async fn invoke_at_timer(
        &mut self,
        times: &[Value],
        expiration: Option<&Value>,
    ) -> ExecResult<Box<dyn TupleStream>>;

    async fn invoke_query(&mut self, function: &str, params: &Tuple) -> ExecResult<Vec<Tuple>>;

    async fn invoke_action(&mut self, function: &str, params: &Tuple) -> ExecResult<()>;

    fn read_state(&mut self, slot: usize) -> Json;

    fn write_state(&mut self, slot: usize, value: Json);

    /// Emit a tuple to the downstream sink (`notify`).
    async fn output(&mut self, tuple: &Tuple) -> ExecResult<()>;

    /// Report a recovered failure inside the named boundary.
    fn report_error(&mut self, scope: ErrorScope, error: &ExecError);

    async fn send_end_of_flow(&mut self, principal: &Value, flow: &Value) -> ExecResult<()>;

    /// Render a tuple for human consumption; delegated to the formatter by
    /// real environments.
    fn format_event(&self, tuple: &Tuple, _hint: &str) -> String {
        let mut fields: Vec<String> = tuple.iter().map(|(k, v)| format!("{k}={v}")).collect();
        fields.sort();
        fields.join(", ")
    }
}
