//! Registration step table: the linear chain of questions the
//! registration scenario walks through.

use serde::{Deserialize, Serialize};

/// A step of the registration dialogue.
///
/// Progresses linearly: Name → Age → Gender → Weight → TargetWeight →
/// Height → ActivityLevel → Done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    Name,
    Age,
    Gender,
    Weight,
    TargetWeight,
    Height,
    ActivityLevel,
    Done,
}

impl RegistrationStep {
    /// Whether this step is terminal (registration is complete).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl Default for RegistrationStep {
    fn default() -> Self {
        StepTable::FIRST
    }
}

impl std::fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Weight => "weight",
            Self::TargetWeight => "target_weight",
            Self::Height => "height",
            Self::ActivityLevel => "activity_level",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// The shape of answer a step expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text that must not be empty.
    Text,
    /// A whole number.
    Integer,
    /// Free-text category, accepted verbatim.
    Category,
}

/// Immutable definition of one step.
#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    pub step: RegistrationStep,
    pub prompt: &'static str,
    pub rejection: &'static str,
    pub kind: FieldKind,
    /// `None` for the last question; answering it completes registration.
    pub next: Option<RegistrationStep>,
}

/// Reply sent once registration is complete, and for every message after.
pub const COMPLETION_MESSAGE: &str = "Thank you! Your profile has been created.";

static STEPS: &[StepDefinition] = &[
    StepDefinition {
        step: RegistrationStep::Name,
        prompt: "What is your name?",
        rejection: "You entered an invalid name",
        kind: FieldKind::Text,
        next: Some(RegistrationStep::Age),
    },
    StepDefinition {
        step: RegistrationStep::Age,
        prompt: "How old are you?",
        rejection: "You entered an invalid age",
        kind: FieldKind::Integer,
        next: Some(RegistrationStep::Gender),
    },
    StepDefinition {
        step: RegistrationStep::Gender,
        prompt: "What is your gender?",
        rejection: "You entered an invalid gender",
        kind: FieldKind::Category,
        next: Some(RegistrationStep::Weight),
    },
    StepDefinition {
        step: RegistrationStep::Weight,
        prompt: "How many kg do you weigh?",
        rejection: "You entered an invalid weight",
        kind: FieldKind::Integer,
        next: Some(RegistrationStep::TargetWeight),
    },
    StepDefinition {
        step: RegistrationStep::TargetWeight,
        prompt: "How many kg would you like to weigh?",
        rejection: "You entered an invalid target weight",
        kind: FieldKind::Integer,
        next: Some(RegistrationStep::Height),
    },
    StepDefinition {
        step: RegistrationStep::Height,
        prompt: "How tall are you in cm?",
        rejection: "You entered an invalid height",
        kind: FieldKind::Integer,
        next: Some(RegistrationStep::ActivityLevel),
    },
    StepDefinition {
        step: RegistrationStep::ActivityLevel,
        prompt: "What is your activity level?",
        rejection: "You entered an invalid activity level",
        kind: FieldKind::Category,
        next: None,
    },
];

/// Lookup over the static step chain.
pub struct StepTable;

impl StepTable {
    /// The step every fresh session starts at.
    pub const FIRST: RegistrationStep = RegistrationStep::Name;

    /// All question steps in order.
    pub fn steps() -> &'static [StepDefinition] {
        STEPS
    }

    /// Definition for `step`, or `None` for the terminal state.
    pub fn get(step: RegistrationStep) -> Option<&'static StepDefinition> {
        STEPS.iter().find(|d| d.step == step)
    }

    /// The state that follows `step`: the declared successor, or `Done`
    /// when the step has none. `Done` maps to itself.
    pub fn successor(step: RegistrationStep) -> RegistrationStep {
        Self::get(step)
            .and_then(|d| d.next)
            .unwrap_or(RegistrationStep::Done)
    }

    /// Prompt shown when the user arrives at `step`.
    pub fn prompt(step: RegistrationStep) -> &'static str {
        Self::get(step)
            .map(|d| d.prompt)
            .unwrap_or(COMPLETION_MESSAGE)
    }
}
