use std::fmt;

use rand::Rng;
use thiserror::Error;

use crate::quiz::{
    format_value, AnswerOption, Category, Difficulty, Question, QuestionRequest,
    PASS_THRESHOLD_PERCENT, POINTS_CORRECT, POINTS_INCORRECT, POINTS_STREAK_BONUS,
    QUESTIONS_PER_LEVEL, STREAK_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    AwaitingQuestion,
    Answering,
    Answered,
    LevelResults,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::AwaitingQuestion => write!(f, "awaiting question"),
            Status::Answering => write!(f, "answering"),
            Status::Answered => write!(f, "answered"),
            Status::LevelResults => write!(f, "level results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} while {status}")]
    InvalidTransition { action: &'static str, status: Status },
}

/// Result of the last answer, kept until the player moves on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedback {
    pub correct: bool,
    pub correct_answer: f64,
    pub streak_bonus: bool,
}

impl Feedback {
    pub fn message(&self) -> String {
        if self.correct {
            format!("Correct! The answer is {}.", format_value(self.correct_answer))
        } else {
            format!(
                "Incorrect. The correct answer was {}.",
                format_value(self.correct_answer)
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelOutcome {
    pub passed: bool,
    pub correct_count: u32,
    pub total: u32,
    pub accuracy: f64,
    pub score: u32,
    pub level_played: u32,
    pub next_level: u32,
}

/// Things the caller has to act on after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The session is waiting for the provider. `epoch` identifies the session
    /// the request belongs to.
    QuestionRequested { request: QuestionRequest, epoch: u64 },
    StreakBonus { streak: u32, points: u32 },
    LevelFinished(LevelOutcome),
    QuestionLoadFailed { message: String },
}

/// A new session snapshot plus the events the transition raised.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Step {
    pub session: Session,
    pub events: Vec<GameEvent>,
}

impl Step {
    fn quiet(session: Session) -> Self {
        Self {
            session,
            events: Vec::new(),
        }
    }

    /// The provider request raised by this step, if any.
    pub fn question_request(&self) -> Option<QuestionRequest> {
        self.events.iter().find_map(|event| match event {
            GameEvent::QuestionRequested { request, .. } => Some(*request),
            _ => None,
        })
    }
}

/// Progression state for one player.
///
/// Every transition borrows the current snapshot and returns a new one, so a
/// rejected transition never leaves a half-updated session behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    status: Status,
    level: u32,
    score: u32,
    questions_answered: u32,
    correct_count: u32,
    streak: u32,
    category: Option<Category>,
    difficulty: Option<Difficulty>,
    current_question: Option<Question>,
    current_options: Vec<AnswerOption>,
    selected_value: Option<f64>,
    feedback: Option<Feedback>,
    outcome: Option<LevelOutcome>,
    epoch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            level: 1,
            score: 0,
            questions_answered: 0,
            correct_count: 0,
            streak: 0,
            category: None,
            difficulty: None,
            current_question: None,
            current_options: Vec::new(),
            selected_value: None,
            feedback: None,
            outcome: None,
            epoch: 0,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn questions_answered(&self) -> u32 {
        self.questions_answered
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.as_ref()
    }

    pub fn options(&self) -> &[AnswerOption] {
        &self.current_options
    }

    pub fn selected_value(&self) -> Option<f64> {
        self.selected_value
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn outcome(&self) -> Option<&LevelOutcome> {
        self.outcome.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 1-based number of the question being asked or just answered.
    pub fn question_number(&self) -> u32 {
        match self.status {
            Status::Answered | Status::LevelResults => self.questions_answered,
            _ => (self.questions_answered + 1).min(QUESTIONS_PER_LEVEL),
        }
    }

    pub fn is_last_question(&self) -> bool {
        self.questions_answered >= QUESTIONS_PER_LEVEL
    }

    pub fn start_game(
        &self,
        category: Category,
        difficulty: Difficulty,
    ) -> Result<Step, TransitionError> {
        self.expect_status("start a game", &[Status::Idle, Status::LevelResults])?;

        let session = Session {
            status: Status::AwaitingQuestion,
            category: Some(category),
            difficulty: Some(difficulty),
            epoch: self.epoch + 1,
            ..Session::default()
        };
        log::debug!("starting {} ({}) game", category, difficulty);
        Ok(session.awaiting_question())
    }

    pub fn question_loaded<R: Rng + ?Sized>(
        &self,
        question: Question,
        rng: &mut R,
    ) -> Result<Step, TransitionError> {
        self.expect_status("load a question", &[Status::AwaitingQuestion])?;

        let mut session = self.clone();
        session.current_options = AnswerOption::shuffled(&question, rng);
        session.current_question = Some(question);
        session.selected_value = None;
        session.feedback = None;
        session.status = Status::Answering;
        Ok(Step::quiet(session))
    }

    /// The provider gave up. Progress of the whole session is dropped.
    pub fn question_load_failed(
        &self,
        message: impl Into<String>,
    ) -> Result<Step, TransitionError> {
        self.expect_status("fail a question load", &[Status::AwaitingQuestion])?;

        let message = message.into();
        log::warn!(
            "question load failed at level {}, returning to menu: {}",
            self.level,
            message
        );
        Ok(Step {
            session: self.reset(),
            events: vec![GameEvent::QuestionLoadFailed { message }],
        })
    }

    pub fn submit_answer(&self, value: f64) -> Result<Step, TransitionError> {
        if self.status == Status::Answered {
            return Ok(Step::quiet(self.clone()));
        }
        self.expect_status("submit an answer", &[Status::Answering])?;

        let Some(question) = self.current_question.as_ref() else {
            return Err(TransitionError::InvalidTransition {
                action: "submit an answer",
                status: self.status,
            });
        };

        let mut session = self.clone();
        let mut events = Vec::new();
        let correct = question.is_correct(value);
        let mut streak_bonus = false;

        if correct {
            session.score += POINTS_CORRECT;
            session.streak += 1;
            session.correct_count += 1;
            if session.streak >= STREAK_THRESHOLD {
                session.score += POINTS_STREAK_BONUS;
                streak_bonus = true;
                events.push(GameEvent::StreakBonus {
                    streak: session.streak,
                    points: POINTS_STREAK_BONUS,
                });
            }
        } else {
            session.score = session.score.saturating_sub(POINTS_INCORRECT);
            session.streak = 0;
        }

        session.questions_answered = (session.questions_answered + 1).min(QUESTIONS_PER_LEVEL);
        session.selected_value = Some(value);
        session.feedback = Some(Feedback {
            correct,
            correct_answer: question.correct_answer(),
            streak_bonus,
        });
        session.status = Status::Answered;

        Ok(Step { session, events })
    }

    pub fn advance(&self) -> Result<Step, TransitionError> {
        self.expect_status("advance", &[Status::Answered])?;

        let mut session = self.clone();
        session.current_question = None;
        session.current_options.clear();
        session.selected_value = None;
        session.feedback = None;

        if !self.is_last_question() {
            return Ok(session.awaiting_question());
        }

        let passed = self.correct_count * 100 >= PASS_THRESHOLD_PERCENT * QUESTIONS_PER_LEVEL;
        let next_level = if passed { self.level + 1 } else { self.level };
        let outcome = LevelOutcome {
            passed,
            correct_count: self.correct_count,
            total: QUESTIONS_PER_LEVEL,
            accuracy: f64::from(self.correct_count) / f64::from(QUESTIONS_PER_LEVEL) * 100.0,
            score: self.score,
            level_played: self.level,
            next_level,
        };
        log::info!(
            "level {} finished with {}/{} correct, passed: {}",
            self.level,
            self.correct_count,
            QUESTIONS_PER_LEVEL,
            passed
        );

        session.level = next_level;
        session.outcome = Some(outcome);
        session.status = Status::LevelResults;
        Ok(Step {
            session,
            events: vec![GameEvent::LevelFinished(outcome)],
        })
    }

    /// Plays the same category again at the level the results left off at.
    pub fn replay_same_category(&self) -> Result<Step, TransitionError> {
        self.expect_status("replay", &[Status::LevelResults])?;

        let session = Session {
            status: Status::AwaitingQuestion,
            level: self.level,
            category: self.category,
            difficulty: self.difficulty,
            epoch: self.epoch + 1,
            ..Session::default()
        };
        Ok(session.awaiting_question())
    }

    pub fn choose_new_category(&self) -> Step {
        Step::quiet(self.reset())
    }

    /// Raises the pending provider request again for a session that is still
    /// waiting, e.g. after the previous fetch was lost.
    pub fn resume_request(&self) -> Result<Step, TransitionError> {
        self.expect_status("resume a question request", &[Status::AwaitingQuestion])?;
        Ok(self.clone().awaiting_question())
    }

    pub fn reset_to_menu(&self) -> Step {
        Step::quiet(self.reset())
    }

    fn reset(&self) -> Session {
        Session {
            epoch: self.epoch + 1,
            ..Session::default()
        }
    }

    fn awaiting_question(mut self) -> Step {
        self.status = Status::AwaitingQuestion;
        let events = match (self.category, self.difficulty) {
            (Some(category), Some(difficulty)) => vec![GameEvent::QuestionRequested {
                request: QuestionRequest::new(self.level, category, difficulty),
                epoch: self.epoch,
            }],
            _ => Vec::new(),
        };
        Step {
            session: self,
            events,
        }
    }

    fn expect_status(&self, action: &'static str, allowed: &[Status]) -> Result<(), TransitionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                action,
                status: self.status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ANSWER: f64 = 12.0;
    const WRONG: f64 = 99.0;

    fn question() -> Question {
        Question::new("3 * 4 = ?", ANSWER, [7.0, 34.0, 1.0], Difficulty::Medium)
    }

    fn started() -> Session {
        Session::new()
            .start_game(Category::Arithmetic, Difficulty::Medium)
            .unwrap()
            .session
    }

    fn load(session: &Session, rng: &mut StdRng) -> Session {
        session.question_loaded(question(), rng).unwrap().session
    }

    /// Loads a question, answers it, and advances past it.
    fn play(session: &Session, correct: bool, rng: &mut StdRng) -> Step {
        let value = if correct { ANSWER } else { WRONG };
        let answered = load(session, rng).submit_answer(value).unwrap().session;
        answered.advance().unwrap()
    }

    fn play_level(correct_answers: u32) -> Step {
        let mut rng = StdRng::seed_from_u64(11);
        let mut session = started();
        let mut step = None;
        for index in 0..QUESTIONS_PER_LEVEL {
            let next = play(&session, index < correct_answers, &mut rng);
            session = next.session.clone();
            step = Some(next);
        }
        step.unwrap()
    }

    #[test]
    fn start_game_requests_first_question() {
        let step = Session::new()
            .start_game(Category::Geometry, Difficulty::Hard)
            .unwrap();

        assert_eq!(step.session.status(), Status::AwaitingQuestion);
        assert_eq!(step.session.level(), 1);
        assert_eq!(step.session.score(), 0);
        assert_eq!(
            step.question_request(),
            Some(QuestionRequest::new(1, Category::Geometry, Difficulty::Hard))
        );
    }

    #[test]
    fn start_game_rejected_mid_level() {
        let session = started();
        let err = session
            .start_game(Category::Logic, Difficulty::Easy)
            .unwrap_err();

        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                action: "start a game",
                status: Status::AwaitingQuestion,
            }
        );
    }

    #[test]
    fn question_loaded_builds_four_options() {
        let mut rng = StdRng::seed_from_u64(3);
        let session = load(&started(), &mut rng);

        assert_eq!(session.status(), Status::Answering);
        assert_eq!(session.options().len(), 4);
        assert_eq!(
            session.options().iter().filter(|o| o.value == ANSWER).count(),
            1
        );
    }

    #[test]
    fn answer_requires_a_loaded_question() {
        assert!(started().submit_answer(ANSWER).is_err());
        assert!(Session::new().submit_answer(ANSWER).is_err());
    }

    #[test]
    fn second_answer_is_ignored() {
        let mut rng = StdRng::seed_from_u64(5);
        let answered = load(&started(), &mut rng)
            .submit_answer(ANSWER)
            .unwrap()
            .session;
        let again = answered.submit_answer(WRONG).unwrap();

        assert!(again.events.is_empty());
        assert_eq!(again.session, answered);
        assert_eq!(again.session.score(), 10);
    }

    #[test]
    fn three_correct_answers_award_streak_bonus() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut session = started();
        let mut last = None;
        for _ in 0..3 {
            let answered = load(&session, &mut rng).submit_answer(ANSWER).unwrap();
            session = answered.session.advance().unwrap().session;
            last = Some(answered);
        }
        let last = last.unwrap();

        assert_eq!(session.streak(), 3);
        assert_eq!(session.score(), 60);
        assert_eq!(
            last.events,
            vec![GameEvent::StreakBonus {
                streak: 3,
                points: POINTS_STREAK_BONUS
            }]
        );
        assert!(last.session.feedback().unwrap().streak_bonus);
    }

    #[test]
    fn streak_bonus_repeats_past_threshold() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut session = started();
        for _ in 0..4 {
            session = play(&session, true, &mut rng).session;
        }

        // 10 + 10 + 30 + 30
        assert_eq!(session.score(), 80);
        assert_eq!(session.streak(), 4);
    }

    #[test]
    fn score_clamps_at_zero() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut session = started();
        session.score = 3;
        let answered = load(&session, &mut rng).submit_answer(WRONG).unwrap().session;

        assert_eq!(answered.score(), 0);
        assert_eq!(
            answered.feedback().unwrap().message(),
            "Incorrect. The correct answer was 12."
        );
    }

    #[test]
    fn wrong_answer_resets_long_streak() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut session = started();
        for _ in 0..5 {
            session = play(&session, true, &mut rng).session;
        }
        assert_eq!(session.streak(), 5);

        let answered = load(&session, &mut rng).submit_answer(WRONG).unwrap().session;
        assert_eq!(answered.streak(), 0);
    }

    #[test]
    fn counters_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(12);
        let pattern = [true, false, false, true, true, true, false, true, false, true];
        let mut session = started();
        for correct in pattern {
            let loaded = load(&session, &mut rng);
            let value = if correct { ANSWER } else { WRONG };
            let answered = loaded.submit_answer(value).unwrap().session;
            assert!(answered.correct_count() <= answered.questions_answered());
            assert!(answered.questions_answered() <= QUESTIONS_PER_LEVEL);
            session = answered.advance().unwrap().session;
            assert!(session.correct_count() <= session.questions_answered());
        }
        assert_eq!(session.status(), Status::LevelResults);
        assert_eq!(session.questions_answered(), QUESTIONS_PER_LEVEL);
    }

    #[test]
    fn advance_requests_next_question() {
        let mut rng = StdRng::seed_from_u64(13);
        let step = play(&started(), true, &mut rng);

        assert_eq!(step.session.status(), Status::AwaitingQuestion);
        assert!(step.session.current_question().is_none());
        assert!(step.session.feedback().is_none());
        assert_eq!(step.session.question_number(), 2);
        assert!(step.question_request().is_some());
    }

    #[test]
    fn seventy_percent_passes_level() {
        let step = play_level(7);
        let outcome = step.session.outcome().copied().unwrap();

        assert_eq!(step.session.status(), Status::LevelResults);
        assert!(outcome.passed);
        assert_eq!(outcome.accuracy, 70.0);
        assert_eq!(outcome.level_played, 1);
        assert_eq!(step.session.level(), 2);
        assert_eq!(step.events, vec![GameEvent::LevelFinished(outcome)]);
    }

    #[test]
    fn sixty_percent_fails_level() {
        let step = play_level(6);
        let outcome = step.session.outcome().copied().unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.accuracy, 60.0);
        assert_eq!(step.session.level(), 1);
        assert_eq!(outcome.next_level, 1);
    }

    #[test]
    fn replay_keeps_level_and_category() {
        let results = play_level(9).session;
        let step = results.replay_same_category().unwrap();

        assert_eq!(step.session.status(), Status::AwaitingQuestion);
        assert_eq!(step.session.level(), 2);
        assert_eq!(step.session.score(), 0);
        assert_eq!(step.session.streak(), 0);
        assert_eq!(step.session.questions_answered(), 0);
        assert_eq!(step.session.category(), Some(Category::Arithmetic));
        assert_eq!(
            step.question_request(),
            Some(QuestionRequest::new(2, Category::Arithmetic, Difficulty::Medium))
        );
    }

    #[test]
    fn replay_only_from_results() {
        assert!(started().replay_same_category().is_err());
    }

    #[test]
    fn start_game_after_results_resets_level() {
        let results = play_level(10).session;
        assert_eq!(results.level(), 2);

        let step = results
            .start_game(Category::Logic, Difficulty::Easy)
            .unwrap();
        assert_eq!(step.session.level(), 1);
    }

    #[test]
    fn load_failure_returns_to_idle() {
        let mut rng = StdRng::seed_from_u64(14);
        let session = play(&started(), true, &mut rng).session;
        let step = session.question_load_failed("rate limit exceeded").unwrap();

        assert_eq!(step.session.status(), Status::Idle);
        assert_eq!(step.session.score(), 0);
        assert_eq!(step.session.category(), None);
        assert_eq!(
            step.events,
            vec![GameEvent::QuestionLoadFailed {
                message: "rate limit exceeded".to_string()
            }]
        );
    }

    #[test]
    fn reset_works_from_any_state() {
        let mut rng = StdRng::seed_from_u64(15);
        let answering = load(&started(), &mut rng);
        let step = answering.reset_to_menu();

        assert_eq!(step.session.status(), Status::Idle);
        assert_eq!(step.session.level(), 1);
        assert!(step.session.epoch() > answering.epoch());

        let results = play_level(8).session;
        let fresh = results.choose_new_category().session;
        assert_eq!(fresh.level(), 1);
        assert_eq!(fresh.difficulty(), None);
    }

    #[test]
    fn question_loaded_rejected_outside_awaiting() {
        let mut rng = StdRng::seed_from_u64(16);
        let err = Session::new().question_loaded(question(), &mut rng).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                action: "load a question",
                status: Status::Idle,
            }
        );

        let answering = load(&started(), &mut rng);
        assert!(answering.question_loaded(question(), &mut rng).is_err());
    }

    #[test]
    fn advance_rejected_before_answer() {
        let mut rng = StdRng::seed_from_u64(17);
        let answering = load(&started(), &mut rng);
        let err = answering.advance().unwrap_err();

        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                action: "advance",
                status: Status::Answering,
            }
        );
        assert_eq!(answering.status(), Status::Answering);
    }

    #[test]
    fn load_failure_rejected_outside_awaiting() {
        let mut rng = StdRng::seed_from_u64(18);
        let answering = load(&started(), &mut rng);

        assert!(answering.question_load_failed("503").is_err());
        assert!(Session::new().question_load_failed("503").is_err());
    }

    #[test]
    fn resume_reissues_pending_request() {
        let mut rng = StdRng::seed_from_u64(19);
        let waiting = play(&started(), true, &mut rng).session;
        let step = waiting.resume_request().unwrap();

        assert_eq!(step.session, waiting);
        assert_eq!(
            step.events,
            vec![GameEvent::QuestionRequested {
                request: QuestionRequest::new(1, Category::Arithmetic, Difficulty::Medium),
                epoch: waiting.epoch(),
            }]
        );

        let answering = load(&waiting, &mut rng);
        assert!(answering.resume_request().is_err());
    }
}
