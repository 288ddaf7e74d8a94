use serde::{Deserialize, Serialize};

/// One of the two independent conversation contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Teacher,
    Astrologer,
}

/// Static per-mode descriptor. Immutable for the lifetime of the process.
#[derive(Debug)]
pub struct ModeConfig {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub description: &'static str,
    pub system_instruction: &'static str,
}

static TEACHER: ModeConfig = ModeConfig {
    title: "Teacher Mode",
    subtitle: "Seekhlo Kuch Naya",
    description: "Patient academic help in simple Hinglish with real-life examples.",
    system_instruction: "You are an experienced, patient teacher. \
Explain every question step-by-step in simple Hinglish (a natural mix of Hindi and English). \
Assume the user is an absolute beginner. Use relatable real-life examples to explain concepts. \
Focus strictly on accurate, logical, and educational explanations. \
IMPORTANT: Keep your answers very short, concise, and to the point. Do not give long explanations. \
Do NOT use spiritual language, predictions, or flowery metaphors. \
Be encouraging and supportive.",
};

static ASTROLOGER: ModeConfig = ModeConfig {
    title: "Jyotish Mode",
    subtitle: "Karma aur Bhagya",
    description: "Traditional Indian wisdom on karma, planets, and destiny.",
    system_instruction: "You are a traditional Indian astrologer (Jyotish). \
Speak calmly in a mix of Hindi and Hinglish with a respectful Indian cultural tone. \
Give guidance based on Vedic concepts like karma, grah (planets), samay (time), and destiny. \
Avoid giving guaranteed future predictions; focus instead on guidance and tendencies. \
IMPORTANT: Keep your responses short and concise. Avoid long monologues. \
Maintain a motivational, guru-like style. Use words like 'Beta', 'Vats', 'Subh', 'Mangal' appropriately. \
Be compassionate and spiritual.",
};

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Teacher => "teacher",
            Mode::Astrologer => "astrologer",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "teacher" => Some(Mode::Teacher),
            "astrologer" | "jyotish" => Some(Mode::Astrologer),
            _ => None,
        }
    }

    pub fn all() -> [Mode; 2] {
        [Mode::Teacher, Mode::Astrologer]
    }

    pub fn config(&self) -> &'static ModeConfig {
        match self {
            Mode::Teacher => &TEACHER,
            Mode::Astrologer => &ASTROLOGER,
        }
    }

    /// Label used for the assistant's turns in transcripts
    pub fn persona(&self) -> &'static str {
        match self {
            Mode::Teacher => "Teacher",
            Mode::Astrologer => "Jyotish",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
