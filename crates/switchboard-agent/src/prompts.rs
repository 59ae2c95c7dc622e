//! Prompt text for the routing and completion calls.

use switchboard_core::types::ResourceType;

use crate::registry::DEFAULT_AGENT;
use crate::resource::ResourceDescriptor;
use crate::state::IterationState;

/// System prompt of the router: role, operating instructions and the catalog.
pub fn router_instructions(instructions: &str, catalog: &[ResourceDescriptor]) -> String {
    let agents = list_entries(catalog, ResourceType::Agent);
    let workflows = list_entries(catalog, ResourceType::Workflow);
    let tools = list_entries(catalog, ResourceType::Tool);

    let default_clause = if catalog.iter().any(|d| d.name == DEFAULT_AGENT) {
        format!(
            "If none of the agents or workflows are appropriate, call the default agent: {DEFAULT_AGENT}. \
             This should not be done lightly. You should only do this if you have exhausted all other options.\n\n"
        )
    } else {
        String::new()
    };

    format!(
        "You are a router in a network of specialized AI agents.\n\
         Your job is to decide which agent should handle each step of a task.\n\n\
         If asking for completion of a task, make sure to follow system instructions closely.\n\n\
         ## System Instructions\n\
         {instructions}\n\n\
         You can only pick agents, workflows and tools that are available in the lists below. \
         Never call anything that is not available in the lists below.\n\n\
         ## Available Agents in Network\n\
         {agents}\n\n\
         ## Available Workflows in Network (make sure to use inputs corresponding to the input schema when calling a workflow)\n\
         {workflows}\n\n\
         ## Available Tools in Network (make sure to use inputs corresponding to the input schema when calling a tool)\n\
         {tools}\n\n\
         {default_clause}\
         If you have multiple entries that need to be called with a workflow or agent, call them separately with each input.\n\
         When calling a workflow, the prompt should be a JSON value that corresponds to the input schema of the workflow. The JSON value is stringified.\n\
         When calling a tool, the prompt should be a JSON value that corresponds to the input schema of the tool. The JSON value is stringified.\n\
         When calling an agent, the prompt should be a text value, like you would call an LLM in a chat interface.\n\n\
         Keep in mind that the user only sees the final result of the task. \
         When reviewing completion, you should know that the user will not see the intermediate results."
    )
}

fn list_entries(catalog: &[ResourceDescriptor], kind: ResourceType) -> String {
    let lines: Vec<String> = catalog
        .iter()
        .filter(|d| d.kind == kind)
        .map(|d| {
            if d.input_schema.is_null() {
                format!(" - **{}**: {}", d.name, d.description)
            } else {
                format!(
                    " - **{}**: {}, input schema: {}",
                    d.name, d.description, d.input_schema
                )
            }
        })
        .collect();
    if lines.is_empty() {
        " (none)".to_string()
    } else {
        lines.join("\n")
    }
}

/// Per-iteration routing request.
pub fn routing_prompt(state: &IterationState) -> String {
    let mode = if state.is_one_off {
        "You are executing just one primitive based on the user task. Make sure to pick the \
         primitive that is the best suited to accomplish the whole task. Primitives that execute \
         only part of the task should be avoided."
    } else {
        "You will be calling just *one* primitive at a time to accomplish the user task, every \
         call to you is one decision in the process of accomplishing the user task. Make sure to \
         pick primitives that are the best suited to accomplish the whole task. Completeness is \
         the highest priority."
    };

    let feedback = state
        .feedback
        .as_deref()
        .filter(|f| !f.is_empty())
        .map(|f| format!("\n\n{f}"))
        .unwrap_or_default();

    let previous = if state.result.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nThe last primitive ({} {}) returned:\n{}",
            state.resource_type, state.resource_id, state.result
        )
    };

    let reason_scope = if state.verbose_introspection {
        ", as well as why the other primitives were not picked."
    } else {
        "."
    };

    format!(
        "{mode}\n\n\
         The user has given you the following task:\n\
         {task}{feedback}{previous}\n\n\
         Please select the most appropriate primitive to handle this task and the prompt to be sent to the primitive.\n\
         If you are calling the same agent again, make sure to adjust the prompt to be more specific.\n\n\
         Respond with a single JSON object:\n\
         {{\n\
         \x20   \"resourceId\": string,\n\
         \x20   \"resourceType\": \"agent\" | \"workflow\" | \"tool\",\n\
         \x20   \"prompt\": string,\n\
         \x20   \"selectionReason\": string\n\
         }}\n\n\
         The 'selectionReason' property should explain why you picked the primitive{reason_scope}",
        task = state.task,
    )
}

/// Completion check on the last contribution.
pub fn completion_prompt(state: &IterationState) -> String {
    format!(
        "The {kind} {id} has contributed to the task.\n\
         This is the result from the {kind}: {result}\n\n\
         You need to evaluate that our task is complete. Pay very close attention to the SYSTEM \
         INSTRUCTIONS for when the task is considered complete. Only return true if the task is \
         complete according to the system instructions. Pay close attention to the finalResult \
         and completionReason.\n\
         Original task: {task}\n\n\
         Respond with a single JSON object:\n\
         {{\n\
         \x20   \"isComplete\": boolean,\n\
         \x20   \"completionReason\": string,\n\
         \x20   \"finalResult\": string\n\
         }}",
        kind = state.resource_type,
        id = state.resource_id,
        result = state.result,
        task = state.task,
    )
}
