pub mod ai_helper;
pub mod provider;
pub mod session;

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

/// Answers a player has to give before the level is scored.
pub const QUESTIONS_PER_LEVEL: u32 = 10;
/// Minimum accuracy, in percent, for a level to count as passed.
pub const PASS_THRESHOLD_PERCENT: u32 = 70;
pub const POINTS_CORRECT: u32 = 10;
pub const POINTS_INCORRECT: u32 = 5;
pub const POINTS_STREAK_BONUS: u32 = 20;
pub const STREAK_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Arithmetic,
    Algebra,
    Geometry,
    WordProblems,
    Logic,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Arithmetic,
        Category::Algebra,
        Category::Geometry,
        Category::WordProblems,
        Category::Logic,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Arithmetic => "Arithmetic",
            Category::Algebra => "Algebra",
            Category::Geometry => "Geometry",
            Category::WordProblems => "Word Problems",
            Category::Logic => "Logic",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|difficulty| difficulty.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the session asks the question provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionRequest {
    pub level: u32,
    pub category: Category,
    pub difficulty: Difficulty,
}

impl QuestionRequest {
    pub fn new(level: u32, category: Category, difficulty: Difficulty) -> Self {
        Self {
            level,
            category,
            difficulty,
        }
    }
}

/// A generated question. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    text: String,
    correct_answer: f64,
    distractors: [f64; 3],
    difficulty: Difficulty,
}

impl Question {
    pub fn new(
        text: impl Into<String>,
        correct_answer: f64,
        distractors: [f64; 3],
        difficulty: Difficulty,
    ) -> Self {
        Self {
            text: text.into(),
            correct_answer,
            distractors,
            difficulty,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn correct_answer(&self) -> f64 {
        self.correct_answer
    }

    pub fn distractors(&self) -> [f64; 3] {
        self.distractors
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn is_correct(&self, value: f64) -> bool {
        value == self.correct_answer
    }
}

/// One of the four buttons shown for a question.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOption {
    pub display_text: String,
    pub value: f64,
}

impl AnswerOption {
    pub fn new(value: f64) -> Self {
        Self {
            display_text: format_value(value),
            value,
        }
    }

    /// Builds the correct answer and the three distractors in a random order.
    ///
    /// Duplicate values coming from the generator are kept as they are.
    pub fn shuffled<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> Vec<AnswerOption> {
        let mut options = Vec::with_capacity(4);
        options.push(AnswerOption::new(question.correct_answer()));
        options.extend(question.distractors().into_iter().map(AnswerOption::new));
        options.shuffle(rng);
        options
    }
}

/// Shortest decimal rendering: `5`, `2.5`, `-3`.
pub fn format_value(value: f64) -> String {
    format!("{}", value)
}
