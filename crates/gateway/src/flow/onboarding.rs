//! Deterministic onboarding handlers: consent, language (where the
//! conversation ID is reserved), name, user level, and device intake.

use serde_json::json;

use tb_domain::conversation::{
    ConversationRecord, DeviceCategory, Language, Status, SystemEventName, UserLevel,
};
use tb_domain::stage::{ButtonToken, Stage};
use tb_domain::Result;

use crate::state::AppState;

use super::{buttons, texts, transition, TurnInput, TurnOutput};

pub fn consent(record: &mut ConversationRecord, input: &TurnInput) -> Result<TurnOutput> {
    let lang = record.language;
    match input.input.button() {
        Some(ButtonToken::ConsentYes) => {
            transition(record, Stage::AskLanguage, "consent_accepted");
            Ok(TurnOutput::with_buttons(
                texts::ask_language(lang),
                buttons::defaults(Stage::AskLanguage, lang),
            ))
        }
        Some(ButtonToken::ConsentNo) => {
            transition(record, Stage::Ended, "consent_declined");
            record.status = Status::Closed;
            Ok(TurnOutput::ended(texts::consent_declined(lang)))
        }
        _ => Ok(TurnOutput::with_buttons(
            texts::greeting(lang),
            buttons::defaults(Stage::AskConsent, lang),
        )),
    }
}

/// Language selection is the moment the conversation earns its ID: not
/// earlier (abandoned greetings must not burn IDs) and not later (every
/// persisted turn carries it).
pub async fn language(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let selected = match input.input.button() {
        Some(ButtonToken::LangEsAr) => Language::EsAr,
        Some(ButtonToken::LangEn) => Language::En,
        _ => {
            return Ok(TurnOutput::with_buttons(
                texts::ask_language(record.language),
                buttons::defaults(Stage::AskLanguage, record.language),
            ))
        }
    };

    record.language = selected;

    if record.conversation_id.is_none() {
        let id = state.ids.reserve().await?;
        record.conversation_id = Some(id.clone());
        record.push_system(
            SystemEventName::ConversationIdAssigned,
            json!({ "conversation_id": id.as_str() }),
        );
        state.repo.promote(record, &id)?;
    }

    transition(record, Stage::AskName, "language_selected");
    let id_str = record
        .conversation_id
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();
    Ok(TurnOutput::text(texts::id_assigned(selected, &id_str)))
}

pub fn name(record: &mut ConversationRecord, input: &TurnInput) -> Result<TurnOutput> {
    let lang = record.language;
    let Some(raw) = input.input.text() else {
        return Ok(TurnOutput::text(texts::ask_name_again(lang)));
    };
    let Some(clean) = sanitize_name(raw) else {
        return Ok(TurnOutput::text(texts::ask_name_again(lang)));
    };

    record.user.display_name = Some(clean.clone());
    transition(record, Stage::AskUserLevel, "name_provided");
    Ok(TurnOutput::with_buttons(
        texts::ask_user_level(lang, &clean),
        buttons::defaults(Stage::AskUserLevel, lang),
    ))
}

pub fn user_level(record: &mut ConversationRecord, input: &TurnInput) -> Result<TurnOutput> {
    let lang = record.language;
    let level = match input.input.button() {
        Some(ButtonToken::UserLevelBasic) => UserLevel::Basic,
        Some(ButtonToken::UserLevelIntermediate) => UserLevel::Intermediate,
        Some(ButtonToken::UserLevelAdvanced) => UserLevel::Advanced,
        _ => {
            return Ok(TurnOutput::with_buttons(
                texts::use_buttons(lang),
                buttons::defaults(Stage::AskUserLevel, lang),
            ))
        }
    };

    record.user_level = Some(level);
    transition(record, Stage::AskDeviceCategory, "level_selected");
    Ok(TurnOutput::with_buttons(
        texts::ask_device_category(lang),
        buttons::defaults(Stage::AskDeviceCategory, lang),
    ))
}

pub fn device_category(record: &mut ConversationRecord, input: &TurnInput) -> Result<TurnOutput> {
    let lang = record.language;
    match input.input.button() {
        Some(ButtonToken::DeviceMain) => {
            record.context.device_category = Some(DeviceCategory::Main);
            transition(record, Stage::AskDeviceTypeMain, "category_main");
            Ok(TurnOutput::with_buttons(
                texts::ask_device_type_main(lang),
                buttons::defaults(Stage::AskDeviceTypeMain, lang),
            ))
        }
        Some(ButtonToken::DeviceExternal) => {
            record.context.device_category = Some(DeviceCategory::External);
            transition(record, Stage::AskDeviceTypeExternal, "category_external");
            Ok(TurnOutput::text(texts::ask_device_type_external(lang)))
        }
        _ => Ok(TurnOutput::with_buttons(
            texts::use_buttons(lang),
            buttons::defaults(Stage::AskDeviceCategory, lang),
        )),
    }
}

pub fn device_type_main(record: &mut ConversationRecord, input: &TurnInput) -> Result<TurnOutput> {
    let lang = record.language;
    let device = match &input.input {
        super::UserInput::Button { value, .. } => match value {
            ButtonToken::Notebook => Some("notebook".to_string()),
            ButtonToken::Desktop => Some("desktop".to_string()),
            _ => None,
        },
        super::UserInput::Text(t) => sanitize_device(t),
    };

    let Some(device) = device else {
        return Ok(TurnOutput::with_buttons(
            texts::ask_device_type_main(lang),
            buttons::defaults(Stage::AskDeviceTypeMain, lang),
        ));
    };

    record.context.device_type = Some(device);
    transition(record, Stage::AskProblem, "device_known");
    Ok(TurnOutput::text(texts::ask_problem(lang)))
}

pub fn device_type_external(
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;
    let Some(device) = input.input.text().and_then(sanitize_device) else {
        return Ok(TurnOutput::text(texts::ask_device_type_external(lang)));
    };

    record.context.device_type = Some(device);
    transition(record, Stage::AskProblem, "device_known");
    Ok(TurnOutput::text(texts::ask_problem(lang)))
}

// ── Input sanitization ──────────────────────────────────────────────

/// Collapse whitespace, strip control characters, cap the length. `None`
/// when nothing usable remains.
fn sanitize_name(raw: &str) -> Option<String> {
    let clean: String = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .take(60)
        .collect();
    let clean = clean.trim().to_string();
    if clean.is_empty() || clean.chars().all(|c| !c.is_alphabetic()) {
        None
    } else {
        Some(clean)
    }
}

fn sanitize_device(raw: &str) -> Option<String> {
    let clean: String = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .take(80)
        .collect::<String>()
        .to_lowercase();
    if clean.trim().is_empty() {
        None
    } else {
        Some(clean.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_sanitization() {
        assert_eq!(sanitize_name("  Lucas   García "), Some("Lucas García".into()));
        assert_eq!(sanitize_name("\u{0007}Ana"), Some("Ana".into()));
        assert_eq!(sanitize_name("   "), None);
        assert_eq!(sanitize_name("12345"), None);
        let long = "x".repeat(200);
        assert_eq!(sanitize_name(&long).unwrap().len(), 60);
    }

    #[test]
    fn device_sanitization() {
        assert_eq!(sanitize_device(" NoteBook  Lenovo "), Some("notebook lenovo".into()));
        assert_eq!(sanitize_device("  "), None);
    }
}
