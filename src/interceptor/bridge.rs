//! Hook invoked by a driver right before it executes a command, plus a
//! wrapper that installs the hook around any [`CommandExecutor`].

use super::classify::{CommandPathway, classify_operation, extract_table_name};
use super::collector::QueryTicket;
use crate::correlation::RequestContext;
use crate::model::query::UNKNOWN_LABEL;
use crate::model::{OperationKind, QueryRecord};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use std::panic::{AssertUnwindSafe, Location};

/// What the hook can see of the connection a command runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub database_kind: String,
    pub database_name: String,
}

impl ConnectionInfo {
    pub fn new(database_kind: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            database_kind: database_kind.into(),
            database_name: database_name.into(),
        }
    }
}

/// A command about to be executed.
#[derive(Debug, Clone)]
pub struct Command {
    pub text: String,
    pub parameters: Map<String, Value>,
    pub pathway: CommandPathway,
    caller: Option<String>,
    location: &'static Location<'static>,
}

impl Command {
    /// Records where the command was built, used when no caller label is given.
    #[track_caller]
    pub fn new(text: impl Into<String>, pathway: CommandPathway) -> Self {
        Self {
            text: text.into(),
            parameters: Map::new(),
            pathway,
            caller: None,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn read(text: impl Into<String>) -> Self {
        Self::new(text, CommandPathway::Read)
    }

    /// A read returning a single value, such as a count.
    #[track_caller]
    pub fn scalar(text: impl Into<String>) -> Self {
        Self::new(text, CommandPathway::Scalar)
    }

    #[track_caller]
    pub fn write(text: impl Into<String>) -> Self {
        Self::new(text, CommandPathway::Write)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Explicit `Type.method` label of the code issuing the command.
    pub fn caller(mut self, label: impl Into<String>) -> Self {
        self.caller = Some(label.into());
        self
    }

    /// Caller label: the explicit one, else the construction site.
    pub fn caller_label(&self) -> String {
        match self.caller.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("{}:{}", self.location.file(), self.location.line()),
        }
    }
}

struct CommandDescription {
    operation: OperationKind,
    table_name: String,
    caller: String,
}

fn describe(command: &Command) -> CommandDescription {
    let described = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let operation = classify_operation(&command.text, command.pathway);
        CommandDescription {
            operation,
            table_name: extract_table_name(&command.text, operation),
            caller: command.caller_label(),
        }
    }));
    described.unwrap_or_else(|_| CommandDescription {
        operation: OperationKind::Unknown,
        table_name: UNKNOWN_LABEL.to_string(),
        caller: UNKNOWN_LABEL.to_string(),
    })
}

/// The pre-execution hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryInterceptor;

impl QueryInterceptor {
    pub fn new() -> Self {
        Self
    }

    /// Buffers a record for the request in flight on this task. No-op
    /// outside a tracked request.
    pub fn before_execute(&self, command: &Command, connection: &ConnectionInfo) -> Option<QueryTicket> {
        let context = RequestContext::current()?;
        self.before_execute_in(&context, command, connection)
    }

    /// Same as [`before_execute`](Self::before_execute) with an explicit context.
    pub fn before_execute_in(
        &self,
        context: &RequestContext,
        command: &Command,
        connection: &ConnectionInfo,
    ) -> Option<QueryTicket> {
        let description = describe(command);
        let parameters =
            serde_json::to_string(&command.parameters).unwrap_or_else(|_| "{}".to_string());
        context.queries().push(QueryRecord {
            database_kind: connection.database_kind.clone(),
            database_name: connection.database_name.clone(),
            command_text: command.text.clone(),
            parameters,
            operation: description.operation,
            table_name: description.table_name,
            caller: description.caller,
            duration_ms: 0,
            started_at: Utc::now(),
            success: true,
            error_message: None,
        })
    }
}

/// Any driver able to run a [`Command`].
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    type Output: Send;
    type Error: fmt::Display + Send;

    fn connection(&self) -> &ConnectionInfo;

    async fn execute(&self, command: &Command) -> std::result::Result<Self::Output, Self::Error>;
}

/// Runs the hook around every command of the wrapped executor.
pub struct InterceptedExecutor<E> {
    inner: E,
    interceptor: QueryInterceptor,
}

impl<E> InterceptedExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            interceptor: QueryInterceptor::new(),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E> CommandExecutor for InterceptedExecutor<E>
where
    E: CommandExecutor,
{
    type Output = E::Output;
    type Error = E::Error;

    fn connection(&self) -> &ConnectionInfo {
        self.inner.connection()
    }

    async fn execute(&self, command: &Command) -> std::result::Result<Self::Output, Self::Error> {
        let ticket = self
            .interceptor
            .before_execute(command, self.inner.connection());
        let result = self.inner.execute(command).await;
        if let Some(ticket) = ticket {
            ticket.finish(result.as_ref().err().map(ToString::to_string));
        }
        result
    }
}
