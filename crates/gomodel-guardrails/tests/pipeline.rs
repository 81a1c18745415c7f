use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gomodel_common::GatewayError;
use gomodel_guardrails::{
    Guardrail, GuardrailPipeline, Message, MessageRole, SystemPromptGuardrail, SystemPromptMode,
};

fn user(content: &str) -> Message {
    Message::new(MessageRole::User, content)
}

fn system(content: &str) -> Message {
    Message::new(MessageRole::System, content)
}

fn decorator(name: &str, order: i32, content: &str) -> Arc<dyn Guardrail> {
    Arc::new(SystemPromptGuardrail::new(
        name,
        order,
        SystemPromptMode::Decorator,
        content,
    ))
}

#[tokio::test]
async fn sequential_override_wipes_parallel_decorations() {
    // Orders [0, 0, 1]: two decorators, then an override in its own group.
    let pipeline = GuardrailPipeline::new(vec![
        decorator("A", 0, "X"),
        decorator("B", 0, "Y"),
        Arc::new(SystemPromptGuardrail::new(
            "C",
            1,
            SystemPromptMode::Override,
            "Z",
        )),
    ]);

    let output = pipeline.run(vec![user("hi")]).await.unwrap();
    assert_eq!(output, vec![system("Z"), user("hi")]);
}

#[tokio::test]
async fn sibling_decorators_compose_in_registration_order() {
    let pipeline = GuardrailPipeline::new(vec![decorator("A", 0, "X"), decorator("B", 0, "Y")]);
    let output = pipeline.run(vec![user("hi")]).await.unwrap();
    // A injects "X", then B decorates A's output.
    assert_eq!(output, vec![system("Y\nX"), user("hi")]);
}

#[tokio::test]
async fn groups_run_in_ascending_order_regardless_of_registration() {
    let pipeline = GuardrailPipeline::new(vec![
        Arc::new(SystemPromptGuardrail::new(
            "late",
            5,
            SystemPromptMode::Decorator,
            "outer",
        )),
        Arc::new(SystemPromptGuardrail::new(
            "early",
            -1,
            SystemPromptMode::Inject,
            "base",
        )),
    ]);
    let output = pipeline.run(vec![user("hi")]).await.unwrap();
    assert_eq!(output, vec![system("outer\nbase"), user("hi")]);
}

struct Rejecting {
    order: i32,
    delay: Duration,
}

#[async_trait]
impl Guardrail for Rejecting {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn apply(&self, _messages: Vec<Message>) -> Result<Vec<Message>, GatewayError> {
        tokio::time::sleep(self.delay).await;
        Err(GatewayError::guardrail("content rejected"))
    }
}

#[tokio::test]
async fn group_error_short_circuits_the_pipeline() {
    let pipeline = GuardrailPipeline::new(vec![
        decorator("A", 0, "X"),
        Arc::new(Rejecting {
            order: 0,
            delay: Duration::from_millis(5),
        }),
        Arc::new(SystemPromptGuardrail::new(
            "never",
            1,
            SystemPromptMode::Override,
            "Z",
        )),
    ]);

    let err = pipeline.run(vec![user("hi")]).await.unwrap_err();
    assert_eq!(err.message, "content rejected");
}

#[tokio::test]
async fn empty_pipeline_is_identity() {
    let pipeline = GuardrailPipeline::new(Vec::new());
    assert!(pipeline.is_empty());
    let input = vec![system("s"), user("u")];
    assert_eq!(pipeline.run(input.clone()).await.unwrap(), input);
}
