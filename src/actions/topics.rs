use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::Action;
use crate::error::{AppError, Result};
use crate::platform::types::Repository;
use crate::platform::Platform;

const MAX_TOPIC_LEN: usize = 50;

/// Add topics to repositories, keeping any topics already present.
pub struct TopicApply {
    platform: Arc<dyn Platform>,
    topics: Vec<String>,
}

impl TopicApply {
    pub fn new(platform: Arc<dyn Platform>, topics: Vec<String>) -> Result<Self> {
        let mut normalized: Vec<String> = Vec::new();
        for topic in topics {
            let topic = normalize_topic(&topic)?;
            if !normalized.contains(&topic) {
                normalized.push(topic);
            }
        }
        if normalized.is_empty() {
            return Err(AppError::Validation("No topics defined".to_string()));
        }
        Ok(Self {
            platform,
            topics: normalized,
        })
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

fn normalize_topic(topic: &str) -> Result<String> {
    let topic = topic.trim().to_lowercase();
    let valid = !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && topic.starts_with(|c: char| c.is_ascii_alphanumeric())
        && topic.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(AppError::Validation(format!(
            "Invalid topic {topic:?}: use lowercase letters, digits and hyphens, at most {MAX_TOPIC_LEN} characters"
        )));
    }
    Ok(topic)
}

#[async_trait]
impl Action for TopicApply {
    fn name(&self) -> &str {
        "topics"
    }

    fn describe(&self, repo: &Repository) -> String {
        format!("would add topics [{}] to {repo}", self.topics.join(", "))
    }

    async fn apply(&self, repo: &Repository) -> Result<String> {
        let mut names = self.platform.get_topics(repo).await?;

        let added: Vec<String> = self
            .topics
            .iter()
            .filter(|t| !names.contains(t))
            .cloned()
            .collect();

        if added.is_empty() {
            return Ok("topics already present".to_string());
        }

        names.extend(added.iter().cloned());
        self.platform.replace_topics(repo, &names).await?;

        Ok(format!("added {}", added.join(", ")))
    }

    fn cost(&self) -> u64 {
        2
    }
}
