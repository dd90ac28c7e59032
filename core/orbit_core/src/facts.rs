use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::warn;

use crate::llm::TextGenerator;

pub const FALLBACK_TOPICS: [&str; 3] = ["Science", "History", "Technology"];

/// Uniform choice among the user's interests, or the fallback set when there are none.
pub fn pick_topic<R: Rng + ?Sized>(interests: &[String], rng: &mut R) -> String {
    match interests.choose(rng) {
        Some(topic) => topic.clone(),
        None => FALLBACK_TOPICS
            .choose(rng)
            .map(|t| t.to_string())
            .unwrap_or_default(),
    }
}

pub fn fact_prompt(topic: &str) -> String {
    format!(
        "Tell me a mind-blowing, weird, or incredibly fun fact about {topic} that most people don't know.\n\
         Make it witty and interesting, not boring or textbook-like.\n\
         Do NOT mention the topic name explicitly in the sentence.\n\
         Max 2 sentences.\n"
    )
}

/// One fact for a random interest. Failures come back as a printable message.
pub async fn random_fact(interests: &[String], llm: &dyn TextGenerator) -> String {
    // ThreadRng is not Send, keep it out of the await.
    let topic = pick_topic(interests, &mut rand::rng());
    match llm.generate(&fact_prompt(&topic)).await {
        Ok(text) => text,
        Err(err) => {
            warn!("fact generation failed: {err:#}");
            format!("Error fetching fact: {err}")
        }
    }
}
