use serde::{Deserialize, Serialize};

/// The four agents the backend pipeline runs, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AgentId {
    Reasoner,
    Planner,
    Generation,
    Reviewer,
}

impl AgentId {
    pub(crate) fn all() -> [AgentId; 4] {
        [
            AgentId::Reasoner,
            AgentId::Planner,
            AgentId::Generation,
            AgentId::Reviewer,
        ]
    }

    /// Canonical lowercase key.
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            AgentId::Reasoner => "reasoner",
            AgentId::Planner => "planner",
            AgentId::Generation => "generation",
            AgentId::Reviewer => "reviewer",
        }
    }

    /// Name as it appears in the section header.
    pub(crate) fn display_name(&self) -> &'static str {
        match self {
            AgentId::Reasoner => "Reasoner",
            AgentId::Planner => "Planner",
            AgentId::Generation => "Generation",
            AgentId::Reviewer => "Reviewer",
        }
    }

    pub(crate) fn icon(&self) -> &'static str {
        match self {
            AgentId::Reasoner => "\u{25C8}",
            AgentId::Planner => "\u{2630}",
            AgentId::Generation => "\u{276E}\u{276F}",
            AgentId::Reviewer => "\u{2713}",
        }
    }

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reasoner" => Some(AgentId::Reasoner),
            "planner" => Some(AgentId::Planner),
            "generation" => Some(AgentId::Generation),
            "reviewer" => Some(AgentId::Reviewer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_case_and_padding() {
        assert_eq!(AgentId::parse(" PLANNER "), Some(AgentId::Planner));
        assert_eq!(AgentId::parse("generation"), Some(AgentId::Generation));
        assert_eq!(AgentId::parse("validator"), None);
    }

    #[test]
    fn canonical_keys_round_trip_through_parse() {
        for agent in AgentId::all() {
            assert_eq!(AgentId::parse(agent.as_str()), Some(agent));
            assert_eq!(AgentId::parse(agent.display_name()), Some(agent));
        }
    }
}
