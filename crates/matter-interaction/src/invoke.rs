//! Invoke (spec.md §4.G.4): up to `maxPathsPerInvoke` command
//! invocations, preserving input order in the response stream.

use crate::endpoint::EndpointGraph;
use crate::error::{ImStatus, StatusError};
use crate::write::TimedContext;
use matter_types::{AccessLevel, ConcreteCommandPath, NodeId, OpaqueValue, Schema};

#[derive(Debug, Clone)]
pub struct CommandDataIn {
    pub path: ConcreteCommandPath,
    pub fields: OpaqueValue,
}

#[derive(Debug, Clone)]
pub enum InvokeResponse {
    Value { path: ConcreteCommandPath, value: OpaqueValue },
    StatusSuccess { path: ConcreteCommandPath },
    StatusError { path: ConcreteCommandPath, status: ImStatus, cluster_status: Option<u8> },
}

/// A cluster's command handler (spec.md §9: "composition of typed state
/// plus a handler vtable per cluster" — this is that vtable's invoke
/// entry point). Takes the graph by exclusive reference rather than
/// holding its own lock on it, so a single lock acquisition covers both
/// [`invoke`]'s access checks and the handler's mutation.
pub trait CommandHandler: Send + Sync {
    fn invoke(&self, graph: &mut EndpointGraph, path: ConcreteCommandPath, fields: &OpaqueValue) -> Result<Option<OpaqueValue>, StatusError>;
}

#[allow(clippy::too_many_arguments)]
pub fn invoke(
    graph: &mut EndpointGraph,
    handler: &dyn CommandHandler,
    max_paths_per_invoke: usize,
    commands: &[CommandDataIn],
    subject: Option<NodeId>,
    timed: &TimedContext,
    schema: &dyn Schema,
) -> Result<Vec<InvokeResponse>, ImStatus> {
    if commands.len() > max_paths_per_invoke {
        return Err(ImStatus::PathsExhausted);
    }

    let mut responses = Vec::with_capacity(commands.len());
    for command in commands {
        if !graph.command_exists(&command.path) {
            responses.push(InvokeResponse::StatusError { path: command.path, status: ImStatus::UnsupportedCommand, cluster_status: None });
            continue;
        }
        if !graph.check_invoke_access(command.path.endpoint, subject, AccessLevel::Operate) {
            responses.push(InvokeResponse::StatusError { path: command.path, status: ImStatus::UnsupportedAccess, cluster_status: None });
            continue;
        }
        // spec.md §4.G.4: "Commands may be marked timed with same
        // semantics as timed write."
        let requires_timed = schema.command_meta(command.path.cluster, command.path.command).is_some_and(|meta| meta.timed_invoke);
        if requires_timed && !timed.armed {
            let status = if timed.expired { ImStatus::Timeout } else { ImStatus::NeedsTimedInteraction };
            responses.push(InvokeResponse::StatusError { path: command.path, status, cluster_status: None });
            continue;
        }
        match handler.invoke(graph, command.path, &command.fields) {
            Ok(Some(value)) => responses.push(InvokeResponse::Value { path: command.path, value }),
            Ok(None) => responses.push(InvokeResponse::StatusSuccess { path: command.path }),
            Err(err) => responses.push(InvokeResponse::StatusError { path: command.path, status: err.status, cluster_status: err.cluster_status }),
        }
    }
    Ok(responses)
}
