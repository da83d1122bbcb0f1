use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use crate::{AdapterError, InferenceProvider};

pub const DEFAULT_MODEL: &str = "gpt-4.1";

pub struct OpenAiInference {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiInference {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenAiInference {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl InferenceProvider for OpenAiInference {
    async fn invoke(&self, system_instruction: &str, task_instruction: &str) -> Result<String, AdapterError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_instruction.to_string())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(task_instruction.to_string())
                .build()?
                .into(),
        ];
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        debug!(model = %self.model, usage = ?response.usage, "inference reply");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AdapterError::Message("no content in inference reply".to_string()))
    }
}
