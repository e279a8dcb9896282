//! Conversation stages and the button contract.
//!
//! Two static tables live here:
//! - `Stage::spec()` — per-stage kind, allowed button tokens, and the
//!   defaults substituted when a deterministic stage ends up button-less.
//! - `Stage::may_transition()` — the legal transition map the FSM runtime
//!   clamps against.
//!
//! The token catalog is closed; adding a token is a schema change and is
//! versioned together with `SCHEMA_VERSION`.

use serde::{Deserialize, Serialize};

use crate::conversation::Status;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    AskConsent,
    AskLanguage,
    AskName,
    AskUserLevel,
    AskDeviceCategory,
    AskDeviceTypeMain,
    AskDeviceTypeExternal,
    AskProblem,
    AskProblemClarification,
    DiagnosticStep,
    ConnectivityFlow,
    InstallationStep,
    RiskConfirmation,
    GuidedStory,
    EmotionalRelease,
    ContextResume,
    AskInteractionMode,
    AskLearningDepth,
    AskExecutorRole,
    AskFeedback,
    Ended,
}

/// How a stage computes its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Input validated locally; next state fully determined.
    Deterministic,
    /// Reply and/or buttons come from the classifier / step generator.
    LlmGoverned,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AskConsent => "ASK_CONSENT",
            Stage::AskLanguage => "ASK_LANGUAGE",
            Stage::AskName => "ASK_NAME",
            Stage::AskUserLevel => "ASK_USER_LEVEL",
            Stage::AskDeviceCategory => "ASK_DEVICE_CATEGORY",
            Stage::AskDeviceTypeMain => "ASK_DEVICE_TYPE_MAIN",
            Stage::AskDeviceTypeExternal => "ASK_DEVICE_TYPE_EXTERNAL",
            Stage::AskProblem => "ASK_PROBLEM",
            Stage::AskProblemClarification => "ASK_PROBLEM_CLARIFICATION",
            Stage::DiagnosticStep => "DIAGNOSTIC_STEP",
            Stage::ConnectivityFlow => "CONNECTIVITY_FLOW",
            Stage::InstallationStep => "INSTALLATION_STEP",
            Stage::RiskConfirmation => "RISK_CONFIRMATION",
            Stage::GuidedStory => "GUIDED_STORY",
            Stage::EmotionalRelease => "EMOTIONAL_RELEASE",
            Stage::ContextResume => "CONTEXT_RESUME",
            Stage::AskInteractionMode => "ASK_INTERACTION_MODE",
            Stage::AskLearningDepth => "ASK_LEARNING_DEPTH",
            Stage::AskExecutorRole => "ASK_EXECUTOR_ROLE",
            Stage::AskFeedback => "ASK_FEEDBACK",
            Stage::Ended => "ENDED",
        }
    }

    /// Parse a stage identifier (e.g. a classifier `suggested_next_ask`).
    pub fn parse(s: &str) -> Option<Stage> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Button tokens (closed catalog)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

macro_rules! button_tokens {
    ($($variant:ident => $token:literal),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ButtonToken {
            $(#[serde(rename = $token)] $variant),+
        }

        impl ButtonToken {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ButtonToken::$variant => $token),+
                }
            }

            pub fn parse(s: &str) -> Option<ButtonToken> {
                match s {
                    $($token => Some(ButtonToken::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

button_tokens! {
    ConsentYes => "BTN_CONSENT_YES",
    ConsentNo => "BTN_CONSENT_NO",
    LangEsAr => "BTN_LANG_ES_AR",
    LangEn => "BTN_LANG_EN",
    UserLevelBasic => "BTN_USER_LEVEL_BASIC",
    UserLevelIntermediate => "BTN_USER_LEVEL_INTERMEDIATE",
    UserLevelAdvanced => "BTN_USER_LEVEL_ADVANCED",
    DeviceMain => "BTN_DEVICE_MAIN",
    DeviceExternal => "BTN_DEVICE_EXTERNAL",
    Notebook => "BTN_NOTEBOOK",
    Desktop => "BTN_DESKTOP",
    Problema => "BTN_PROBLEMA",
    Wifi => "BTN_WIFI",
    Wired => "BTN_WIRED",
    Yes => "BTN_YES",
    No => "BTN_NO",
    OneBox => "BTN_ONE_BOX",
    TwoBoxes => "BTN_TWO_BOXES",
    LightsOk => "BTN_LIGHTS_OK",
    LightsOff => "BTN_LIGHTS_OFF",
    Solved => "BTN_SOLVED",
    Persist => "BTN_PERSIST",
    AdvancedTests => "BTN_ADVANCED_TESTS",
    ConnectTech => "BTN_CONNECT_TECH",
    RiskContinue => "BTN_RISK_CONTINUE",
    RiskCancel => "BTN_RISK_CANCEL",
    ModeGuided => "BTN_MODE_GUIDED",
    ModeFree => "BTN_MODE_FREE",
    DepthQuick => "BTN_DEPTH_QUICK",
    DepthDeep => "BTN_DEPTH_DEEP",
    RoleSelf => "BTN_ROLE_SELF",
    RoleAssisted => "BTN_ROLE_ASSISTED",
    FeedbackPositive => "BTN_FEEDBACK_POSITIVE",
    FeedbackNegative => "BTN_FEEDBACK_NEGATIVE",
    Resume => "BTN_RESUME",
    Close => "BTN_CLOSE",
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage → button contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static per-stage contract: what the user may press here, and what the
/// bot shows when a deterministic handler comes back empty-handed.
pub struct StageSpec {
    pub kind: StageKind,
    pub allowed: &'static [ButtonToken],
    pub defaults: &'static [ButtonToken],
}

use ButtonToken as B;

static SPEC_ASK_CONSENT: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::ConsentYes, B::ConsentNo],
    defaults: &[B::ConsentYes, B::ConsentNo],
};
static SPEC_ASK_LANGUAGE: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::LangEsAr, B::LangEn],
    defaults: &[B::LangEsAr, B::LangEn],
};
static SPEC_ASK_NAME: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[],
    defaults: &[],
};
static SPEC_ASK_USER_LEVEL: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::UserLevelBasic, B::UserLevelIntermediate, B::UserLevelAdvanced],
    defaults: &[B::UserLevelBasic, B::UserLevelIntermediate, B::UserLevelAdvanced],
};
static SPEC_ASK_DEVICE_CATEGORY: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::DeviceMain, B::DeviceExternal],
    defaults: &[B::DeviceMain, B::DeviceExternal],
};
static SPEC_ASK_DEVICE_TYPE_MAIN: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::Notebook, B::Desktop],
    defaults: &[B::Notebook, B::Desktop],
};
static SPEC_ASK_DEVICE_TYPE_EXTERNAL: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[],
    defaults: &[],
};
static SPEC_ASK_PROBLEM: StageSpec = StageSpec {
    kind: StageKind::LlmGoverned,
    allowed: &[B::ConnectTech, B::Close],
    defaults: &[],
};
static SPEC_ASK_PROBLEM_CLARIFICATION: StageSpec = StageSpec {
    kind: StageKind::LlmGoverned,
    allowed: &[B::ConnectTech, B::Close],
    defaults: &[],
};
static SPEC_DIAGNOSTIC_STEP: StageSpec = StageSpec {
    kind: StageKind::LlmGoverned,
    allowed: &[B::Solved, B::Persist, B::AdvancedTests, B::ConnectTech, B::Close],
    defaults: &[B::Solved, B::Persist, B::ConnectTech],
};
static SPEC_CONNECTIVITY_FLOW: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[
        B::Wifi,
        B::Wired,
        B::Notebook,
        B::Desktop,
        B::Yes,
        B::No,
        B::OneBox,
        B::TwoBoxes,
        B::LightsOk,
        B::LightsOff,
        B::Solved,
        B::Persist,
        B::ConnectTech,
        B::Close,
    ],
    defaults: &[B::Solved, B::Persist, B::ConnectTech],
};
static SPEC_INSTALLATION_STEP: StageSpec = StageSpec {
    kind: StageKind::LlmGoverned,
    allowed: &[B::Solved, B::Persist, B::ConnectTech, B::Close],
    defaults: &[B::Solved, B::Persist, B::ConnectTech],
};
static SPEC_RISK_CONFIRMATION: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::RiskContinue, B::RiskCancel],
    defaults: &[B::RiskContinue, B::RiskCancel],
};
static SPEC_GUIDED_STORY: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::ConnectTech, B::Close],
    defaults: &[],
};
static SPEC_EMOTIONAL_RELEASE: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::Problema, B::ConnectTech, B::Close],
    defaults: &[B::Problema, B::ConnectTech],
};
static SPEC_CONTEXT_RESUME: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::Resume, B::Problema, B::Close],
    defaults: &[B::Resume, B::Close],
};
static SPEC_ASK_INTERACTION_MODE: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::ModeGuided, B::ModeFree],
    defaults: &[B::ModeGuided, B::ModeFree],
};
static SPEC_ASK_LEARNING_DEPTH: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::DepthQuick, B::DepthDeep],
    defaults: &[B::DepthQuick, B::DepthDeep],
};
static SPEC_ASK_EXECUTOR_ROLE: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::RoleSelf, B::RoleAssisted],
    defaults: &[B::RoleSelf, B::RoleAssisted],
};
static SPEC_ASK_FEEDBACK: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[B::FeedbackPositive, B::FeedbackNegative],
    defaults: &[B::FeedbackPositive, B::FeedbackNegative],
};
static SPEC_ENDED: StageSpec = StageSpec {
    kind: StageKind::Deterministic,
    allowed: &[],
    defaults: &[],
};

impl Stage {
    pub fn spec(&self) -> &'static StageSpec {
        match self {
            Stage::AskConsent => &SPEC_ASK_CONSENT,
            Stage::AskLanguage => &SPEC_ASK_LANGUAGE,
            Stage::AskName => &SPEC_ASK_NAME,
            Stage::AskUserLevel => &SPEC_ASK_USER_LEVEL,
            Stage::AskDeviceCategory => &SPEC_ASK_DEVICE_CATEGORY,
            Stage::AskDeviceTypeMain => &SPEC_ASK_DEVICE_TYPE_MAIN,
            Stage::AskDeviceTypeExternal => &SPEC_ASK_DEVICE_TYPE_EXTERNAL,
            Stage::AskProblem => &SPEC_ASK_PROBLEM,
            Stage::AskProblemClarification => &SPEC_ASK_PROBLEM_CLARIFICATION,
            Stage::DiagnosticStep => &SPEC_DIAGNOSTIC_STEP,
            Stage::ConnectivityFlow => &SPEC_CONNECTIVITY_FLOW,
            Stage::InstallationStep => &SPEC_INSTALLATION_STEP,
            Stage::RiskConfirmation => &SPEC_RISK_CONFIRMATION,
            Stage::GuidedStory => &SPEC_GUIDED_STORY,
            Stage::EmotionalRelease => &SPEC_EMOTIONAL_RELEASE,
            Stage::ContextResume => &SPEC_CONTEXT_RESUME,
            Stage::AskInteractionMode => &SPEC_ASK_INTERACTION_MODE,
            Stage::AskLearningDepth => &SPEC_ASK_LEARNING_DEPTH,
            Stage::AskExecutorRole => &SPEC_ASK_EXECUTOR_ROLE,
            Stage::AskFeedback => &SPEC_ASK_FEEDBACK,
            Stage::Ended => &SPEC_ENDED,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.spec().kind
    }

    /// The tokens a user may press right now.
    ///
    /// A terminal status overrides the per-stage table: an escalated
    /// conversation accepts only the close button (its stage is frozen
    /// wherever the handover happened, which may be a stage whose own
    /// allow-list never carries `BTN_CLOSE`), and a closed one accepts
    /// nothing.
    pub fn allowed_for(&self, status: Status) -> &'static [ButtonToken] {
        match status {
            Status::Open => self.spec().allowed,
            Status::Escalated => &[ButtonToken::Close],
            Status::Closed => &[],
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition map
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Diagnostic stages a classifier routing decision may land on.
static DIAGNOSTIC_TARGETS: &[Stage] = &[
    Stage::DiagnosticStep,
    Stage::ConnectivityFlow,
    Stage::InstallationStep,
    Stage::RiskConfirmation,
];

impl Stage {
    /// Whether `from → to` is a legal transition given the record status.
    ///
    /// Terminal statuses restrict everything to `ENDED`. A self-transition
    /// is not a transition and is always fine.
    pub fn may_transition(from: Stage, to: Stage, status: Status) -> bool {
        if from == to {
            return true;
        }
        if status != Status::Open {
            return to == Stage::Ended;
        }
        // Closing and suspending are permitted from any live stage.
        if to == Stage::Ended || to == Stage::ContextResume {
            return from != Stage::Ended;
        }

        let successors: &[Stage] = match from {
            Stage::AskConsent => &[Stage::AskLanguage],
            Stage::AskLanguage => &[Stage::AskName],
            Stage::AskName => &[Stage::AskUserLevel],
            Stage::AskUserLevel => &[Stage::AskDeviceCategory],
            Stage::AskDeviceCategory => {
                &[Stage::AskDeviceTypeMain, Stage::AskDeviceTypeExternal]
            }
            Stage::AskDeviceTypeMain | Stage::AskDeviceTypeExternal => &[Stage::AskProblem],
            Stage::AskProblem => &[
                Stage::AskProblemClarification,
                Stage::DiagnosticStep,
                Stage::ConnectivityFlow,
                Stage::InstallationStep,
                Stage::RiskConfirmation,
                Stage::GuidedStory,
                Stage::EmotionalRelease,
                Stage::AskInteractionMode,
                Stage::AskLearningDepth,
                Stage::AskExecutorRole,
                Stage::AskDeviceCategory,
            ],
            Stage::AskProblemClarification => &[
                Stage::AskProblem,
                Stage::DiagnosticStep,
                Stage::ConnectivityFlow,
                Stage::InstallationStep,
                Stage::RiskConfirmation,
                Stage::GuidedStory,
                Stage::AskDeviceCategory,
                Stage::AskInteractionMode,
                Stage::AskLearningDepth,
                Stage::AskExecutorRole,
            ],
            Stage::DiagnosticStep => &[Stage::AskFeedback, Stage::RiskConfirmation],
            Stage::ConnectivityFlow => &[Stage::DiagnosticStep, Stage::AskFeedback],
            Stage::InstallationStep => &[Stage::DiagnosticStep, Stage::AskFeedback],
            Stage::RiskConfirmation => &[
                Stage::AskProblem,
                Stage::InstallationStep,
                Stage::DiagnosticStep,
                Stage::ConnectivityFlow,
            ],
            Stage::GuidedStory => &[
                Stage::AskProblem,
                Stage::AskProblemClarification,
                Stage::AskDeviceCategory,
                Stage::DiagnosticStep,
                Stage::ConnectivityFlow,
                Stage::InstallationStep,
                Stage::RiskConfirmation,
                Stage::AskInteractionMode,
                Stage::AskLearningDepth,
                Stage::AskExecutorRole,
            ],
            Stage::EmotionalRelease => &[Stage::AskProblem, Stage::GuidedStory],
            Stage::ContextResume => &[
                Stage::DiagnosticStep,
                Stage::ConnectivityFlow,
                Stage::InstallationStep,
                Stage::RiskConfirmation,
                Stage::AskProblem,
                Stage::AskFeedback,
            ],
            Stage::AskInteractionMode => {
                &[Stage::AskLearningDepth, Stage::AskExecutorRole]
            }
            Stage::AskLearningDepth => &[Stage::AskExecutorRole],
            Stage::AskExecutorRole => &[],
            Stage::AskFeedback => &[],
            Stage::Ended => &[],
        };

        if successors.contains(&to) {
            return true;
        }
        // Preference probes hand back to whichever diagnostic path was pending.
        if matches!(
            from,
            Stage::AskInteractionMode | Stage::AskLearningDepth | Stage::AskExecutorRole
        ) {
            return DIAGNOSTIC_TARGETS.contains(&to);
        }
        false
    }
}
