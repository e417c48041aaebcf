//! Quiz flow: question presentation, answer selection, feedback and scoring.
//!
//! `QuizSession` is a plain synchronous state machine. It never talks to the LLM
//! or the store itself; the runtime (`state::QuizRuntime`) spawns explanation
//! requests and persists the finished outcome.
//!
//! The streak-derived difficulty label is advisory only: questions are always
//! served in their authored order.

use serde::Serialize;

use crate::domain::{Question, Quiz};

const HARD_STREAK: i32 = 3;
const EASY_STREAK: i32 = -2;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLabel {
  Easy,
  #[default]
  Normal,
  Hard,
}

impl DifficultyLabel {
  pub fn from_streak(streak: i32) -> Self {
    if streak >= HARD_STREAK {
      DifficultyLabel::Hard
    } else if streak <= EASY_STREAK {
      DifficultyLabel::Easy
    } else {
      DifficultyLabel::Normal
    }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuizPhase {
  Presenting { index: usize },
  AnswerSelected { index: usize, selected: usize },
  FeedbackShown { index: usize, selected: usize, correct: bool },
  Finished { outcome: QuizOutcome },
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AnswerRecord {
  pub question_index: usize,
  pub selected_answer: usize,
  pub correct: bool,
  pub explanation: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct QuizOutcome {
  pub score: u32,
  pub passed: bool,
  pub difficulty: DifficultyLabel,
  pub correct_count: usize,
  pub total_questions: usize,
}

/// Result of `submit_answer`: what the feedback view shows right away.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Feedback {
  pub question_index: usize,
  pub correct: bool,
  pub correct_option_index: usize,
  pub streak: i32,
  pub difficulty: DifficultyLabel,
  /// Set on incorrect answers; the caller may fetch an explanation for them.
  pub wants_explanation: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QuizError {
  #[error("quiz has no questions")]
  EmptyQuiz,
  #[error("option {option} is out of range (question has {available} options)")]
  OptionOutOfRange { option: usize, available: usize },
  #[error("no answer selected")]
  NoAnswerSelected,
  #[error("feedback already shown for this question")]
  FeedbackAlreadyShown,
  #[error("answer must be submitted before advancing")]
  FeedbackNotShown,
  #[error("quiz already finished")]
  Finished,
  #[error("no answer recorded for question {0}")]
  UnknownQuestion(usize),
  #[error("explanation belongs to attempt {got}, current attempt is {current}")]
  StaleAttempt { got: u32, current: u32 },
}

#[derive(Clone, Debug)]
pub struct QuizSession {
  quiz: Quiz,
  phase: QuizPhase,
  answers: Vec<AnswerRecord>,
  streak: i32,
  difficulty: DifficultyLabel,
  /// Starts at 1, bumped by every retake.
  attempt: u32,
}

impl QuizSession {
  pub fn new(quiz: Quiz) -> Result<Self, QuizError> {
    if quiz.questions.is_empty() {
      return Err(QuizError::EmptyQuiz);
    }
    Ok(Self {
      quiz,
      phase: QuizPhase::Presenting { index: 0 },
      answers: Vec::new(),
      streak: 0,
      difficulty: DifficultyLabel::Normal,
      attempt: 1,
    })
  }

  pub fn quiz(&self) -> &Quiz { &self.quiz }
  pub fn phase(&self) -> &QuizPhase { &self.phase }
  pub fn answers(&self) -> &[AnswerRecord] { &self.answers }
  pub fn streak(&self) -> i32 { self.streak }
  pub fn difficulty(&self) -> DifficultyLabel { self.difficulty }
  pub fn attempt(&self) -> u32 { self.attempt }

  pub fn outcome(&self) -> Option<QuizOutcome> {
    match &self.phase {
      QuizPhase::Finished { outcome } => Some(*outcome),
      _ => None,
    }
  }

  /// Index of the question on screen; `None` once finished.
  pub fn current_index(&self) -> Option<usize> {
    match self.phase {
      QuizPhase::Presenting { index }
      | QuizPhase::AnswerSelected { index, .. }
      | QuizPhase::FeedbackShown { index, .. } => Some(index),
      QuizPhase::Finished { .. } => None,
    }
  }

  pub fn current_question(&self) -> Option<&Question> {
    self.current_index().and_then(|i| self.quiz.questions.get(i))
  }

  /// Explanation for the question currently in feedback, if one has arrived.
  pub fn current_explanation(&self) -> Option<&str> {
    match self.phase {
      QuizPhase::FeedbackShown { index, .. } => self
        .answers
        .iter()
        .find(|a| a.question_index == index)
        .and_then(|a| a.explanation.as_deref()),
      _ => None,
    }
  }

  pub fn select_answer(&mut self, option: usize) -> Result<(), QuizError> {
    let index = match self.phase {
      QuizPhase::Presenting { index } | QuizPhase::AnswerSelected { index, .. } => index,
      QuizPhase::FeedbackShown { .. } => return Err(QuizError::FeedbackAlreadyShown),
      QuizPhase::Finished { .. } => return Err(QuizError::Finished),
    };
    let available = self.quiz.questions[index].options.len();
    if option >= available {
      return Err(QuizError::OptionOutOfRange { option, available });
    }
    self.phase = QuizPhase::AnswerSelected { index, selected: option };
    Ok(())
  }

  pub fn submit_answer(&mut self) -> Result<Feedback, QuizError> {
    let (index, selected) = match self.phase {
      QuizPhase::AnswerSelected { index, selected } => (index, selected),
      QuizPhase::Presenting { .. } => return Err(QuizError::NoAnswerSelected),
      QuizPhase::FeedbackShown { .. } => return Err(QuizError::FeedbackAlreadyShown),
      QuizPhase::Finished { .. } => return Err(QuizError::Finished),
    };
    let question = &self.quiz.questions[index];
    let correct = selected == question.correct_option_index;

    self.answers.push(AnswerRecord {
      question_index: index,
      selected_answer: selected,
      correct,
      explanation: None,
    });
    self.streak += if correct { 1 } else { -1 };
    self.difficulty = DifficultyLabel::from_streak(self.streak);
    self.phase = QuizPhase::FeedbackShown { index, selected, correct };

    Ok(Feedback {
      question_index: index,
      correct,
      correct_option_index: question.correct_option_index,
      streak: self.streak,
      difficulty: self.difficulty,
      wants_explanation: !correct,
    })
  }

  /// Store an explanation against the answer for `question_index` in `attempt`.
  /// Late arrivals are kept on the record but never shown on another question;
  /// arrivals from an attempt that was retaken are rejected.
  pub fn attach_explanation(&mut self, attempt: u32, question_index: usize, text: String) -> Result<(), QuizError> {
    if attempt != self.attempt {
      return Err(QuizError::StaleAttempt { got: attempt, current: self.attempt });
    }
    let record = self
      .answers
      .iter_mut()
      .find(|a| a.question_index == question_index)
      .ok_or(QuizError::UnknownQuestion(question_index))?;
    record.explanation = Some(text);
    Ok(())
  }

  pub fn advance(&mut self) -> Result<&QuizPhase, QuizError> {
    let index = match self.phase {
      QuizPhase::FeedbackShown { index, .. } => index,
      QuizPhase::Finished { .. } => return Err(QuizError::Finished),
      _ => return Err(QuizError::FeedbackNotShown),
    };

    if index + 1 < self.quiz.questions.len() {
      self.phase = QuizPhase::Presenting { index: index + 1 };
    } else {
      let outcome = score_outcome(
        self.answers.iter().filter(|a| a.correct).count(),
        self.quiz.questions.len(),
        self.quiz.effective_passing_score(),
        self.difficulty,
      );
      self.phase = QuizPhase::Finished { outcome };
    }
    Ok(&self.phase)
  }

  /// "Retake Quiz": back to the first question with a clean history.
  pub fn retake(&mut self) {
    self.phase = QuizPhase::Presenting { index: 0 };
    self.answers.clear();
    self.streak = 0;
    self.difficulty = DifficultyLabel::Normal;
    self.attempt += 1;
  }
}

pub fn score_outcome(
  correct_count: usize,
  total_questions: usize,
  passing_score: u32,
  difficulty: DifficultyLabel,
) -> QuizOutcome {
  let score = if total_questions == 0 {
    0
  } else {
    (100.0 * correct_count as f64 / total_questions as f64).round() as u32
  };
  QuizOutcome {
    score,
    passed: score >= passing_score,
    difficulty,
    correct_count,
    total_questions,
  }
}
