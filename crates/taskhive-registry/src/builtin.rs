//! Standard agent-type catalog.
//!
//! Deployments usually register these at startup and add their own types on
//! top. Capability ids here are the ones the built-in decomposition
//! patterns route to.

use crate::types::{AgentCategory, AgentType, Capability};

/// The default agent types, one per category of specialist.
pub fn builtin_types() -> Vec<AgentType> {
    vec![
        research_type(),
        code_type(),
        data_type(),
        writer_type(),
        planner_type(),
        critic_type(),
        executor_type(),
        memory_type(),
    ]
}

fn research_type() -> AgentType {
    AgentType::new(
        "research_agent",
        "Research Agent",
        AgentCategory::Research,
        vec![
            Capability::new("web_research", "Web Research")
                .with_tools(vec!["web_search".into(), "web_scraper".into()]),
            Capability::new("data_synthesis", "Data Synthesis").with_tools(vec!["llm".into()]),
        ],
    )
}

fn code_type() -> AgentType {
    AgentType::new(
        "code_agent",
        "Code Agent",
        AgentCategory::Code,
        vec![
            Capability::new("code_writing", "Code Writing")
                .with_tools(vec!["llm".into(), "code_interpreter".into()]),
            Capability::new("code_review", "Code Review")
                .with_tools(vec!["llm".into(), "static_analyzer".into()]),
            Capability::new("debugging", "Debugging")
                .with_tools(vec!["llm".into(), "code_interpreter".into(), "debugger".into()]),
        ],
    )
}

fn data_type() -> AgentType {
    AgentType::new(
        "data_agent",
        "Data Agent",
        AgentCategory::Data,
        vec![
            Capability::new("data_analysis", "Data Analysis")
                .with_tools(vec!["llm".into(), "data_analyzer".into()]),
            Capability::new("visualization", "Data Visualization")
                .with_tools(vec!["visualization_tool".into()]),
        ],
    )
}

fn writer_type() -> AgentType {
    AgentType::new(
        "writer_agent",
        "Writer Agent",
        AgentCategory::Writing,
        vec![
            Capability::new("content_writing", "Content Writing").with_tools(vec!["llm".into()]),
            Capability::new("editing", "Content Editing").with_tools(vec!["llm".into()]),
        ],
    )
}

fn planner_type() -> AgentType {
    AgentType::new(
        "planner_agent",
        "Planner Agent",
        AgentCategory::Planning,
        vec![
            Capability::new("task_planning", "Task Planning").with_tools(vec!["llm".into()]),
            Capability::new("scheduling", "Scheduling").with_tools(vec!["llm".into()]),
        ],
    )
}

fn critic_type() -> AgentType {
    AgentType::new(
        "critic_agent",
        "Critic Agent",
        AgentCategory::Critique,
        vec![
            Capability::new("output_review", "Output Review").with_tools(vec!["llm".into()]),
            Capability::new("quality_check", "Quality Check").with_tools(vec!["llm".into()]),
        ],
    )
}

fn executor_type() -> AgentType {
    AgentType::new(
        "executor_agent",
        "Executor Agent",
        AgentCategory::Execution,
        vec![
            Capability::new("command_execution", "Command Execution")
                .with_tools(vec!["shell".into(), "sandbox".into()]),
            Capability::new("api_calls", "API Calls").with_tools(vec!["http_client".into()]),
        ],
    )
}

fn memory_type() -> AgentType {
    AgentType::new(
        "memory_agent",
        "Memory Agent",
        AgentCategory::Memory,
        vec![
            Capability::new("context_storage", "Context Storage")
                .with_tools(vec!["vector_db".into()]),
            Capability::new("knowledge_retrieval", "Knowledge Retrieval")
                .with_tools(vec!["vector_db".into(), "llm".into()]),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let types = builtin_types();
        assert_eq!(types.len(), 8);

        // Unique type ids, unique capability ids per type.
        let mut ids: Vec<&str> = types.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);

        for ty in &types {
            assert!(!ty.capabilities.is_empty());
        }
    }

    #[test]
    fn test_builtin_routing_capabilities_present() {
        let types = builtin_types();
        for cap in ["web_research", "code_writing", "data_analysis", "output_review"] {
            assert!(
                types.iter().any(|t| t.has_capability(cap)),
                "missing capability {cap}"
            );
        }
    }
}
