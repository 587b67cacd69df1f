mod config;
mod quiz;

use std::sync::Arc;

use chatgpt::client::ChatGPT;
use config::Config;
use dotenv::dotenv;
use quiz::{
    ai_helper::ChatGptGenerator,
    format_value,
    provider::QuestionProvider,
    session::{GameEvent, Session, Status, Step, TransitionError},
    Category, Difficulty, Question, QUESTIONS_PER_LEVEL,
};
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup},
};

type GameDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type Provider = Arc<QuestionProvider<ChatGptGenerator>>;

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceiveCategory,
    ReceiveDifficulty {
        category: Category,
    },
    Playing {
        session: Session,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting math quiz bot...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("Invalid configuration: {}", err);
            return;
        }
    };

    let gpt = match ChatGPT::new(config.chatgpt_api_key.clone()) {
        Ok(mut gpt) => {
            gpt.config.engine = config.engine();
            gpt.config.timeout = config.request_timeout;
            gpt
        }
        Err(err) => {
            log::error!("Unable to set up ChatGPT client: {}", err);
            return;
        }
    };

    let provider: Provider = Arc::new(QuestionProvider::new(ChatGptGenerator::new(gpt)));
    let provider_for_difficulty = provider.clone();

    let bot = Bot::from_env();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveCategory].endpoint(receive_category))
            .branch(
                dptree::case![State::ReceiveDifficulty { category }].endpoint(
                    move |bot: Bot, dialogue: GameDialogue, category: Category, msg: Message| {
                        receive_difficulty(
                            provider_for_difficulty.clone(),
                            bot,
                            dialogue,
                            category,
                            msg,
                        )
                    },
                ),
            )
            .branch(dptree::case![State::Playing { session }].endpoint(
                move |bot: Bot, dialogue: GameDialogue, session: Session, msg: Message| {
                    playing(provider.clone(), bot, dialogue, session, msg)
                },
            )),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new()])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const GREETING_TEXT: &str =
    "Welcome to Math Hero: Brain Battle! Pick a category to start your first level.";
const NEXT_QUESTION: &str = "Next question";
const VIEW_RESULTS: &str = "View results";
const PLAY_AGAIN: &str = "Play again";
const NEW_CATEGORY: &str = "New category";
const MENU: &str = "Menu";

async fn start(bot: Bot, dialogue: GameDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;
    show_categories(&bot, &dialogue, msg.chat.id).await
}

async fn show_categories(bot: &Bot, dialogue: &GameDialogue, chat_id: ChatId) -> HandlerResult {
    let keyboard = KeyboardMarkup::new(
        Category::ALL
            .iter()
            .map(|category| vec![KeyboardButton::new(category.label())])
            .collect::<Vec<_>>(),
    );
    bot.send_message(chat_id, "Choose a category:")
        .reply_markup(keyboard)
        .await?;

    dialogue.update(State::ReceiveCategory).await?;
    Ok(())
}

async fn receive_category(bot: Bot, dialogue: GameDialogue, msg: Message) -> HandlerResult {
    let Some(category) = msg.text().and_then(Category::from_label) else {
        bot.send_message(msg.chat.id, "Please pick one of the categories")
            .await?;
        return Ok(());
    };

    let keyboard = KeyboardMarkup::new(vec![Difficulty::ALL
        .iter()
        .map(|difficulty| KeyboardButton::new(difficulty.label()))
        .collect::<Vec<_>>()]);
    bot.send_message(msg.chat.id, format!("{}! How hard should it be?", category))
        .reply_markup(keyboard)
        .await?;

    dialogue
        .update(State::ReceiveDifficulty { category })
        .await?;
    Ok(())
}

async fn receive_difficulty(
    provider: Provider,
    bot: Bot,
    dialogue: GameDialogue,
    category: Category,
    msg: Message,
) -> HandlerResult {
    let Some(difficulty) = msg.text().and_then(Difficulty::from_label) else {
        bot.send_message(msg.chat.id, "Please pick easy, medium or hard")
            .await?;
        return Ok(());
    };

    let step = Session::new().start_game(category, difficulty)?;
    run_step(provider, &bot, &dialogue, msg.chat.id, step).await
}

async fn playing(
    provider: Provider,
    bot: Bot,
    dialogue: GameDialogue,
    session: Session,
    msg: Message,
) -> HandlerResult {
    let text = msg.text().unwrap_or_default();

    if text == MENU || text == "/start" {
        return run_step(provider, &bot, &dialogue, msg.chat.id, session.reset_to_menu()).await;
    }

    let step = match session.status() {
        Status::Answering => {
            let Some(option) = session
                .options()
                .iter()
                .find(|option| option.display_text == text)
            else {
                bot.send_message(msg.chat.id, "Please answer with one of the buttons")
                    .await?;
                return Ok(());
            };
            session.submit_answer(option.value)?
        }
        Status::Answered if text == NEXT_QUESTION || text == VIEW_RESULTS => session.advance()?,
        Status::LevelResults if text == PLAY_AGAIN => session.replay_same_category()?,
        Status::LevelResults if text == NEW_CATEGORY => session.choose_new_category(),
        Status::AwaitingQuestion => {
            log::info!(
                "Chat {} still waiting on session {}, requesting the question again",
                msg.chat.id.0,
                session.epoch()
            );
            session.resume_request()?
        }
        _ => {
            bot.send_message(msg.chat.id, "Please pick one of the buttons")
                .await?;
            return Ok(());
        }
    };

    run_step(provider, &bot, &dialogue, msg.chat.id, step).await
}

/// Announces the step's events, fetches a question whenever the session asks
/// for one, and stores the resulting session.
async fn run_step(
    provider: Provider,
    bot: &Bot,
    dialogue: &GameDialogue,
    chat_id: ChatId,
    mut step: Step,
) -> HandlerResult {
    loop {
        announce_events(bot, chat_id, &step.events).await?;
        let request = step.question_request();
        let session = step.session;

        let Some(request) = request else {
            return show_session(bot, dialogue, chat_id, session).await;
        };

        dialogue
            .update(State::Playing {
                session: session.clone(),
            })
            .await?;
        let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

        let result = provider.request_question(request).await;

        if !is_current(dialogue, &session).await? {
            log::info!(
                "Discarding question for abandoned session {} in chat {}",
                session.epoch(),
                chat_id.0
            );
            return Ok(());
        }

        step = match result {
            Ok(question) => load_question(&session, question)?,
            Err(err) => session.question_load_failed(err.to_string())?,
        };
        store_session(dialogue, &step.session).await?;
    }
}

/// Saves the session before anything is sent, so a failed send cannot lose
/// the loaded question.
async fn store_session(dialogue: &GameDialogue, session: &Session) -> HandlerResult {
    let state = match session.status() {
        Status::Idle => State::ReceiveCategory,
        _ => State::Playing {
            session: session.clone(),
        },
    };
    dialogue.update(state).await?;
    Ok(())
}

fn load_question(session: &Session, question: Question) -> Result<Step, TransitionError> {
    let mut rng = rand::thread_rng();
    session.question_loaded(question, &mut rng)
}

/// A reset while the provider was busy bumps the epoch, so an old answer
/// must not be applied to the new session.
async fn is_current(
    dialogue: &GameDialogue,
    session: &Session,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let current = dialogue.get().await?;
    Ok(matches!(
        current,
        Some(State::Playing { session: ref stored }) if stored.epoch() == session.epoch()
    ))
}

async fn announce_events(bot: &Bot, chat_id: ChatId, events: &[GameEvent]) -> HandlerResult {
    for event in events {
        match event {
            GameEvent::StreakBonus { streak, points } => {
                bot.send_message(
                    chat_id,
                    format!(
                        "Streak bonus! +{} points for {} correct answers in a row!",
                        points, streak
                    ),
                )
                .await?;
            }
            GameEvent::LevelFinished(outcome) if outcome.passed => {
                bot.send_message(chat_id, "Level passed! Great job, moving to the next level.")
                    .await?;
            }
            GameEvent::LevelFinished(_) => {
                bot.send_message(
                    chat_id,
                    format!(
                        "Level not passed. You need {}% to pass. Try again!",
                        quiz::PASS_THRESHOLD_PERCENT
                    ),
                )
                .await?;
            }
            GameEvent::QuestionLoadFailed { message } => {
                log::error!("Failed to generate question for chat {}: {}", chat_id.0, message);
                bot.send_message(
                    chat_id,
                    "Could not load a new question. The AI might be busy or an error occurred. Please try again.",
                )
                .await?;
            }
            GameEvent::QuestionRequested { request, epoch } => {
                log::debug!(
                    "Requesting level {} {} question for session {} in chat {}",
                    request.level,
                    request.category,
                    epoch,
                    chat_id.0
                );
            }
        }
    }
    Ok(())
}

async fn show_session(
    bot: &Bot,
    dialogue: &GameDialogue,
    chat_id: ChatId,
    session: Session,
) -> HandlerResult {
    match session.status() {
        Status::Idle => return show_categories(bot, dialogue, chat_id).await,
        Status::Answering => {
            let options = session
                .options()
                .chunks(2)
                .map(|pair| {
                    pair.iter()
                        .map(|option| KeyboardButton::new(option.display_text.clone()))
                        .collect::<Vec<_>>()
                })
                .chain(std::iter::once(vec![KeyboardButton::new(MENU)]))
                .collect::<Vec<_>>();
            bot.send_message(chat_id, question_card(&session))
                .reply_markup(KeyboardMarkup::new(options))
                .await?;
        }
        Status::Answered => {
            let mut feedback = match session.selected_value() {
                Some(value) => format!("You chose {}. ", format_value(value)),
                None => String::new(),
            };
            if let Some(result) = session.feedback() {
                feedback.push_str(&result.message());
                if result.streak_bonus {
                    feedback.push_str(" Streak bonus applied.");
                }
            }
            let next = if session.is_last_question() {
                VIEW_RESULTS
            } else {
                NEXT_QUESTION
            };
            bot.send_message(
                chat_id,
                format!(
                    "{}\nScore: {} | Streak: {} | Correct: {}/{}",
                    feedback,
                    session.score(),
                    session.streak(),
                    session.correct_count(),
                    session.questions_answered()
                ),
            )
            .reply_markup(KeyboardMarkup::new(vec![
                vec![KeyboardButton::new(next)],
                vec![KeyboardButton::new(MENU)],
            ]))
            .await?;
        }
        Status::LevelResults => {
            bot.send_message(chat_id, results_screen(&session))
                .reply_markup(KeyboardMarkup::new(vec![vec![
                    KeyboardButton::new(PLAY_AGAIN),
                    KeyboardButton::new(NEW_CATEGORY),
                ]]))
                .await?;
        }
        Status::AwaitingQuestion => {
            log::warn!("Session in chat {} left waiting for a question", chat_id.0);
        }
    }

    dialogue.update(State::Playing { session }).await?;
    Ok(())
}

fn question_card(session: &Session) -> String {
    let header = format!(
        "Level {} | {} | {}\nQuestion {}/{}\nScore: {} | Streak: {}",
        session.level(),
        session.category().map(|c| c.label()).unwrap_or_default(),
        session.difficulty().map(|d| d.label()).unwrap_or_default(),
        session.question_number(),
        QUESTIONS_PER_LEVEL,
        session.score(),
        session.streak()
    );
    let text = session
        .current_question()
        .map(|question| question.text())
        .unwrap_or_default();
    format!("{}\n\n{}", header, text)
}

fn results_screen(session: &Session) -> String {
    let Some(outcome) = session.outcome() else {
        return format!("Level finished. Score: {}", session.score());
    };
    let verdict = if outcome.passed {
        format!("Level {} passed!", outcome.level_played)
    } else {
        format!("Level {} not passed.", outcome.level_played)
    };
    format!(
        "{}\nYou answered {} of {} correctly ({}%).\nFinal score: {}\nNext up: level {} of {} ({})",
        verdict,
        outcome.correct_count,
        outcome.total,
        format_value(outcome.accuracy),
        outcome.score,
        outcome.next_level,
        session.category().map(|c| c.label()).unwrap_or_default(),
        session.difficulty().map(|d| d.label()).unwrap_or_default(),
    )
}
