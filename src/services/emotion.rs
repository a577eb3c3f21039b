use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Curiosity,
    Concern,
    Wisdom,
    Energy,
    Neutral,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Curiosity => "curiosity",
            Emotion::Concern => "concern",
            Emotion::Wisdom => "wisdom",
            Emotion::Energy => "energy",
            Emotion::Neutral => "neutral",
        }
    }
}

impl Default for Emotion {
    fn default() -> Self {
        Emotion::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionResult {
    pub emotion: Emotion,
    pub confidence: f32,
    pub intensity: f32,
}

const JOY_WORDS: [&str; 12] = [
    "great", "excellent", "amazing", "wonderful", "fantastic", "brilliant", "awesome", "perfect",
    "love", "enjoy", "happy", "excited",
];

const CURIOSITY_WORDS: [&str; 12] = [
    "interesting", "curious", "wonder", "explore", "investigate", "discover", "learn",
    "understand", "question", "why", "how", "what if",
];

const CONCERN_WORDS: [&str; 12] = [
    "careful", "warning", "danger", "risk", "problem", "issue", "concern", "worried", "caution",
    "attention", "important", "critical",
];

const WISDOM_WORDS: [&str; 11] = [
    "consider", "think", "reflect", "experience", "knowledge", "insight", "wisdom", "perspective",
    "understanding", "awareness", "mindful",
];

const ENERGY_WORDS: [&str; 12] = [
    "powerful", "dynamic", "energetic", "fast", "quick", "rapid", "boost", "accelerate",
    "momentum", "drive", "force", "strength",
];

// Distinct keywords found as substrings; "why" inside a longer token still counts.
fn keyword_hits(text: &str, words: &[&str]) -> usize {
    words.iter().filter(|word| text.contains(**word)).count()
}

pub fn classify(content: &str) -> EmotionResult {
    let text = content.to_lowercase();

    let scores = [
        (Emotion::Joy, keyword_hits(&text, &JOY_WORDS)),
        (Emotion::Curiosity, keyword_hits(&text, &CURIOSITY_WORDS)),
        (Emotion::Concern, keyword_hits(&text, &CONCERN_WORDS)),
        (Emotion::Wisdom, keyword_hits(&text, &WISDOM_WORDS)),
        (Emotion::Energy, keyword_hits(&text, &ENERGY_WORDS)),
    ];

    // Ties keep the first maximum in declaration order.
    let (mut emotion, mut max_score) = scores[0];
    for (candidate, score) in scores.into_iter().skip(1) {
        if score > max_score {
            emotion = candidate;
            max_score = score;
        }
    }

    if max_score == 0 {
        return EmotionResult {
            emotion: Emotion::Neutral,
            confidence: 0.0,
            intensity: 0.0,
        };
    }

    EmotionResult {
        emotion,
        confidence: (max_score as f32 / 3.0).min(1.0),
        intensity: (max_score as f32 / 2.0).min(1.0),
    }
}
