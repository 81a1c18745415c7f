use std::sync::Arc;

use gomodel_common::GatewayError;

use crate::{Guardrail, Message};

/// Guardrails partitioned into ordered groups by their `order` value.
///
/// Between groups execution is sequential: group K+1 receives group K's
/// output. Within a group every guardrail is invoked concurrently against
/// the same input so a rejection cancels the whole group early; the group's
/// output is then the first sibling's result with each later sibling's
/// transform applied to the accumulated list, in registration order.
pub struct GuardrailPipeline {
    groups: Vec<Vec<Arc<dyn Guardrail>>>,
}

impl GuardrailPipeline {
    pub fn new(mut guardrails: Vec<Arc<dyn Guardrail>>) -> Self {
        // Stable sort keeps registration order within equal-order groups.
        guardrails.sort_by_key(|g| g.order());
        let mut groups: Vec<Vec<Arc<dyn Guardrail>>> = Vec::new();
        for guardrail in guardrails {
            match groups.last_mut() {
                Some(group) if group[0].order() == guardrail.order() => group.push(guardrail),
                _ => groups.push(vec![guardrail]),
            }
        }
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub async fn run(&self, input: Vec<Message>) -> Result<Vec<Message>, GatewayError> {
        let mut current = input;
        for group in &self.groups {
            current = run_group(group, current).await?;
        }
        Ok(current)
    }
}

async fn run_group(
    group: &[Arc<dyn Guardrail>],
    input: Vec<Message>,
) -> Result<Vec<Message>, GatewayError> {
    if group.len() == 1 {
        return group[0].apply(input).await;
    }

    let mut handles = Vec::with_capacity(group.len());
    for guardrail in group {
        let guardrail = guardrail.clone();
        let snapshot = input.clone();
        handles.push(tokio::spawn(
            async move { guardrail.apply(snapshot).await },
        ));
    }

    let mut first_output: Option<Vec<Message>> = None;
    let mut failure: Option<GatewayError> = None;
    for (index, handle) in handles.into_iter().enumerate() {
        if failure.is_some() {
            // Sibling results after a failure are discarded.
            handle.abort();
            continue;
        }
        match handle.await {
            Ok(Ok(messages)) => {
                if index == 0 {
                    first_output = Some(messages);
                }
            }
            Ok(Err(err)) => failure = Some(err),
            Err(_) => failure = Some(GatewayError::internal()),
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let mut accumulated = first_output.unwrap_or(input);
    for guardrail in &group[1..] {
        accumulated = guardrail.apply(accumulated).await?;
    }
    Ok(accumulated)
}
