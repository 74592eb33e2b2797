use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::agent::{AgentInput, FragmentSink, InteractionOutcome, StageAgent};
use crate::error::Result;
use crate::flow::constants::agents;
use crate::protocol::{
    Intent, InteractionElement, InteractionRequest, InteractionType, StreamableResponse, SystemState,
    UserInteraction,
};
use crate::session::Session;
use crate::tools::Role;

const GOAL_MAX_CHARS: usize = 200;

const ROLE_CHOICES: [(Role, &str); 6] = [
    (Role::Developer, "Developer"),
    (Role::Designer, "Designer"),
    (Role::ProductManager, "Product manager"),
    (Role::Marketer, "Marketer"),
    (Role::Student, "Student"),
    (Role::Researcher, "Researcher"),
];

/// 接待阶段：识别用户意图和角色
#[derive(Clone, Copy, Debug, Default)]
pub struct WelcomeAgent;

impl WelcomeAgent {
    pub fn new() -> Self {
        Self
    }

    fn role_choice() -> InteractionRequest {
        ROLE_CHOICES
            .iter()
            .fold(
                InteractionRequest::new(InteractionType::Choice)
                    .titled("What best describes you?")
                    .described("We tailor the page layout and the sources we look at to your role.")
                    .required(true),
                |request, (role, label)| {
                    request.element(InteractionElement::button(
                        format!("role_{}", role.as_str()),
                        *label,
                        role.as_str(),
                    ))
                },
            )
            .element(InteractionElement::button("role_other", "Something else", Role::Other.as_str()))
    }

    fn remember_goal(session: &mut Session, message: &str) {
        let message = message.trim();
        if session.intent.goal.is_none() && !message.is_empty() {
            session.intent.goal = Some(message.chars().take(GOAL_MAX_CHARS).collect());
        }
    }

    fn apply_role(session: &mut Session, role: Role) {
        session.intent.role = Some(role);
        if session.personalization.profession.is_none() && role != Role::Other {
            session.personalization.profession = Some(role.as_str().replace('_', " "));
        }
    }

    fn advance_state(role: Role) -> SystemState {
        SystemState::advance()
            .with_next_agent(agents::INFO_COLLECTION)
            .with_metadata(json!({ "role": role.as_str() }))
    }
}

#[async_trait]
impl StageAgent for WelcomeAgent {
    fn name(&self) -> &str {
        agents::WELCOME
    }

    async fn process(&self, input: &AgentInput, session: &mut Session, sink: &FragmentSink) -> Result<()> {
        Self::remember_goal(session, &input.message);

        if session.intent.role.is_none() {
            if let Some(role) = Role::detect(&input.message) {
                debug!(session_id = %session.id, role = role.as_str(), "role detected from input");
                Self::apply_role(session, role);
            }
        }

        match session.intent.role {
            Some(role) => {
                sink.finish(
                    format!(
                        "Welcome! Let's build a personal page for you as a {}. First I'll gather some material about your work.",
                        role.as_str().replace('_', " ")
                    ),
                    Self::advance_state(role),
                )
                .await
            }
            None => {
                sink.ask(
                    "Welcome! Tell me a little about yourself so I can shape the page around you.",
                    Self::role_choice(),
                    SystemState::park(Intent::UserChoiceRequired),
                )
                .await
            }
        }
    }

    async fn handle_interaction(
        &self,
        interaction: &UserInteraction,
        session: &mut Session,
    ) -> Result<InteractionOutcome> {
        let role = interaction
            .field("role")
            .or_else(|| interaction.field("value"))
            .and_then(Role::parse);

        match role {
            Some(role) => {
                Self::apply_role(session, role);
                let reply = StreamableResponse::reply(format!(
                    "Great, a {} page it is.",
                    role.as_str().replace('_', " ")
                ))
                .with_agent(agents::WELCOME)
                .with_state(Self::advance_state(role));
                Ok(InteractionOutcome::advance().with_response(reply))
            }
            None => {
                let reply = StreamableResponse::reply("Please pick one of the listed roles.")
                    .with_agent(agents::WELCOME)
                    .with_interaction(Self::role_choice())
                    .with_state(SystemState::park(Intent::UserChoiceRequired));
                Ok(InteractionOutcome::stay().with_response(reply))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn choice_interaction_sets_role_and_advances() {
        let mut session = Session::new("w");
        let interaction = UserInteraction::new(InteractionType::Choice, json!({"value": "designer"}));
        let outcome = WelcomeAgent::new()
            .handle_interaction(&interaction, &mut session)
            .await
            .unwrap();
        assert_eq!(outcome.action, crate::agent::InteractionAction::Advance);
        assert_eq!(session.intent.role, Some(Role::Designer));
        assert_eq!(session.personalization.profession.as_deref(), Some("designer"));
    }

    #[tokio::test]
    async fn unknown_choice_stays() {
        let mut session = Session::new("w");
        let interaction = UserInteraction::new(InteractionType::Choice, json!({"value": "astronaut"}));
        let outcome = WelcomeAgent::new()
            .handle_interaction(&interaction, &mut session)
            .await
            .unwrap();
        assert_eq!(outcome.action, crate::agent::InteractionAction::Stay);
        assert!(outcome.response.and_then(|r| r.interaction).is_some());
    }
}
