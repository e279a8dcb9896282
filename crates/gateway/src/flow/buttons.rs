//! Button contract enforcement.
//!
//! The invariant defended here: a bot turn may only ever show buttons the
//! current stage's allow-list permits, at most four of them, with `order`
//! normalized to a contiguous `1..n`. LLM-suggested buttons outside the
//! allow-list are dropped silently; an empty result on a stage that has
//! defaults falls back to those defaults. Buttons never carry over from
//! the previous turn — every handler builds its set from scratch.

use tb_domain::conversation::{Button, Language};
use tb_domain::stage::{ButtonToken, Stage};

use tb_llm::RawButton;

use super::texts;

pub const MAX_BUTTONS: usize = 4;

/// Build localized buttons for a deterministic handler. Tokens outside the
/// stage allow-list are a programming error and are dropped with a warning.
pub fn make(stage: Stage, tokens: &[ButtonToken], lang: Language) -> Vec<Button> {
    let allowed = stage.spec().allowed;
    let mut buttons = Vec::new();
    for token in tokens {
        if !allowed.contains(token) {
            tracing::warn!(
                stage = stage.as_str(),
                token = token.as_str(),
                "handler offered a token outside the stage allow-list"
            );
            continue;
        }
        if buttons.len() == MAX_BUTTONS {
            break;
        }
        buttons.push(Button {
            token: *token,
            label: texts::button_label(*token, lang).to_string(),
            order: buttons.len() as u32 + 1,
        });
    }
    buttons
}

/// The stage's default button set, localized.
pub fn defaults(stage: Stage, lang: Language) -> Vec<Button> {
    make(stage, stage.spec().defaults, lang)
}

/// Filter LLM-suggested buttons through the stage contract.
///
/// Keeps LLM ordering, drops unknown tokens, out-of-allow-list tokens, and
/// empty labels, caps at four, renumbers `order` contiguously. When
/// everything is dropped the stage defaults are substituted (localized
/// here because the LLM labels are gone).
pub fn enforce(stage: Stage, raw: Vec<RawButton>, lang: Language) -> Vec<Button> {
    let allowed = stage.spec().allowed;
    let mut buttons = Vec::new();

    for rb in raw {
        if buttons.len() == MAX_BUTTONS {
            break;
        }
        let Some(token) = ButtonToken::parse(&rb.token) else {
            tracing::debug!(stage = stage.as_str(), token = %rb.token, "dropping unknown token");
            continue;
        };
        if !allowed.contains(&token) {
            tracing::debug!(
                stage = stage.as_str(),
                token = token.as_str(),
                "dropping token outside stage allow-list"
            );
            continue;
        }
        if rb.label.trim().is_empty() {
            continue;
        }
        if buttons.iter().any(|b: &Button| b.token == token) {
            continue;
        }
        buttons.push(Button {
            token,
            label: rb.label,
            order: buttons.len() as u32 + 1,
        });
    }

    if buttons.is_empty() {
        return defaults(stage, lang);
    }
    buttons
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_domain::conversation::Language;

    fn raw(token: &str, label: &str) -> RawButton {
        RawButton {
            token: token.into(),
            label: label.into(),
            order: None,
        }
    }

    #[test]
    fn four_buttons_survive_untouched() {
        let input = vec![
            raw("BTN_SOLVED", "Funcionó"),
            raw("BTN_PERSIST", "Sigue igual"),
            raw("BTN_ADVANCED_TESTS", "Pruebas avanzadas"),
            raw("BTN_CONNECT_TECH", "Técnico"),
        ];
        let out = enforce(Stage::DiagnosticStep, input, Language::EsAr);
        assert_eq!(out.len(), 4);
        assert_eq!(
            out.iter().map(|b| b.order).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn fifth_button_is_dropped_preserving_llm_order() {
        let input = vec![
            raw("BTN_SOLVED", "a"),
            raw("BTN_PERSIST", "b"),
            raw("BTN_ADVANCED_TESTS", "c"),
            raw("BTN_CONNECT_TECH", "d"),
            raw("BTN_CLOSE", "e"),
        ];
        let out = enforce(Stage::DiagnosticStep, input, Language::EsAr);
        assert_eq!(out.len(), 4);
        assert_eq!(out.last().unwrap().token, ButtonToken::ConnectTech);
    }

    #[test]
    fn out_of_allowlist_tokens_are_dropped() {
        let input = vec![
            raw("BTN_LANG_ES_AR", "Español"),
            raw("BTN_SOLVED", "Funcionó"),
        ];
        let out = enforce(Stage::DiagnosticStep, input, Language::EsAr);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].token, ButtonToken::Solved);
        assert_eq!(out[0].order, 1);
    }

    #[test]
    fn unknown_and_empty_label_buttons_are_dropped() {
        let input = vec![
            raw("BTN_INVENTED", "x"),
            raw("BTN_SOLVED", "   "),
            raw("BTN_PERSIST", "Sigue igual"),
        ];
        let out = enforce(Stage::DiagnosticStep, input, Language::EsAr);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].token, ButtonToken::Persist);
    }

    #[test]
    fn empty_result_substitutes_stage_defaults() {
        let input = vec![raw("BTN_LANG_EN", "English")];
        let out = enforce(Stage::DiagnosticStep, input, Language::EsAr);
        let default_tokens: Vec<_> = out.iter().map(|b| b.token).collect();
        assert_eq!(
            default_tokens,
            vec![
                ButtonToken::Solved,
                ButtonToken::Persist,
                ButtonToken::ConnectTech
            ]
        );
        assert!(out.iter().all(|b| !b.label.is_empty()));
    }

    #[test]
    fn duplicate_tokens_collapse() {
        let input = vec![
            raw("BTN_SOLVED", "uno"),
            raw("BTN_SOLVED", "dos"),
            raw("BTN_PERSIST", "tres"),
        ];
        let out = enforce(Stage::DiagnosticStep, input, Language::EsAr);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "uno");
    }

    #[test]
    fn make_localizes_labels() {
        let out = make(
            Stage::AskConsent,
            &[ButtonToken::ConsentYes, ButtonToken::ConsentNo],
            Language::En,
        );
        assert_eq!(out[0].label, "Yes, I agree");
        assert_eq!(out[1].order, 2);
    }
}
