//! The fully deterministic connectivity sub-FSM.
//!
//! Ordered inspection: wifi-or-wired → notebook-or-desktop → ssid-visible
//! → another-device-online → one-box-or-two → lights → ordered power
//! cycle. Every step has its own button set; answers that point at an
//! obvious remediation (SSID missing, network fine elsewhere) jump ahead
//! to the power cycle. Off-script input gets a bounded number of retries
//! before the conversation is handed to a human.

use tb_domain::conversation::{ConnectivityStep, ConversationRecord, Language};
use tb_domain::stage::{ButtonToken, Stage};
use tb_domain::ticket::EscalationReason;
use tb_domain::Result;

use crate::state::AppState;

use super::{buttons, escalate, texts, transition, TurnInput, TurnOutput};

/// The question and button set shown at each position.
fn question(step: ConnectivityStep, lang: Language) -> (&'static str, &'static [ButtonToken]) {
    use ButtonToken as B;
    use ConnectivityStep::*;
    match step {
        WifiOrWired => (texts::conn_wifi_or_wired(lang), &[B::Wifi, B::Wired]),
        NotebookOrDesktop => (
            texts::conn_notebook_or_desktop(lang),
            &[B::Notebook, B::Desktop],
        ),
        SsidVisible => (texts::conn_ssid_visible(lang), &[B::Yes, B::No]),
        AnotherDeviceOnline => (texts::conn_another_device(lang), &[B::Yes, B::No]),
        OneBoxOrTwo => (texts::conn_one_box_or_two(lang), &[B::OneBox, B::TwoBoxes]),
        Lights => (texts::conn_lights(lang), &[B::LightsOk, B::LightsOff]),
        PowerCycle => (
            texts::conn_power_cycle(lang),
            &[B::Solved, B::Persist, B::ConnectTech],
        ),
    }
}

/// Where a valid answer takes the flow next.
fn advance(step: ConnectivityStep, token: ButtonToken) -> Option<ConnectivityStep> {
    use ButtonToken as B;
    use ConnectivityStep::*;
    match (step, token) {
        (WifiOrWired, B::Wifi) => Some(NotebookOrDesktop),
        (WifiOrWired, B::Wired) => Some(OneBoxOrTwo),
        (NotebookOrDesktop, B::Notebook | B::Desktop) => Some(SsidVisible),
        // SSID missing: a power cycle usually brings the network back.
        (SsidVisible, B::No) => Some(PowerCycle),
        (SsidVisible, B::Yes) => Some(AnotherDeviceOnline),
        // Network fine on another device: the problem is this machine.
        (AnotherDeviceOnline, B::Yes) => Some(PowerCycle),
        (AnotherDeviceOnline, B::No) => Some(OneBoxOrTwo),
        (OneBoxOrTwo, B::OneBox | B::TwoBoxes) => Some(Lights),
        (Lights, B::LightsOk | B::LightsOff) => Some(PowerCycle),
        _ => None,
    }
}

/// First connectivity turn, issued right after the classifier routes here.
pub fn enter(record: &mut ConversationRecord) -> TurnOutput {
    let lang = record.language;
    record.context.connectivity_step = Some(ConnectivityStep::WifiOrWired);
    record.context.connectivity_retries = 0;
    transition(record, Stage::ConnectivityFlow, "intent_network");
    let (text, tokens) = question(ConnectivityStep::WifiOrWired, lang);
    TurnOutput::with_buttons(text, buttons::make(Stage::ConnectivityFlow, tokens, lang))
}

/// Re-ask the current connectivity question (after a resume).
pub fn reprompt(record: &ConversationRecord) -> TurnOutput {
    let lang = record.language;
    let step = record
        .context
        .connectivity_step
        .unwrap_or(ConnectivityStep::WifiOrWired);
    let (text, tokens) = question(step, lang);
    TurnOutput::with_buttons(text, buttons::make(Stage::ConnectivityFlow, tokens, lang))
}

pub fn handle(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;
    let step = record
        .context
        .connectivity_step
        .unwrap_or(ConnectivityStep::WifiOrWired);

    match input.input.button() {
        Some(ButtonToken::Solved) => {
            record.context.connectivity_step = None;
            transition(record, Stage::AskFeedback, "connectivity_solved");
            Ok(TurnOutput::with_buttons(
                texts::solved_reply(lang),
                buttons::defaults(Stage::AskFeedback, lang),
            ))
        }
        Some(ButtonToken::Persist) => {
            record.context.diagnostic_attempts += 1;
            record.context.last_press_was_persist = true;
            if record.context.diagnostic_attempts
                >= state.config.flow.diagnostic_attempts_threshold
            {
                return escalate::escalate(state, record, EscalationReason::MultipleAttemptsFailed);
            }
            Ok(TurnOutput::with_buttons(
                texts::conn_alt_step(lang),
                buttons::make(
                    Stage::ConnectivityFlow,
                    &[ButtonToken::Solved, ButtonToken::Persist, ButtonToken::ConnectTech],
                    lang,
                ),
            ))
        }
        Some(token) => match advance(step, token) {
            Some(next) => {
                record.context.connectivity_step = Some(next);
                record.context.connectivity_retries = 0;
                let (text, tokens) = question(next, lang);
                Ok(TurnOutput::with_buttons(
                    text,
                    buttons::make(Stage::ConnectivityFlow, tokens, lang),
                ))
            }
            None => off_script(state, record, step),
        },
        None => off_script(state, record, step),
    }
}

/// Text (or a button that doesn't answer this step): re-ask a bounded
/// number of times, then hand over.
fn off_script(
    state: &AppState,
    record: &mut ConversationRecord,
    step: ConnectivityStep,
) -> Result<TurnOutput> {
    let lang = record.language;
    record.context.connectivity_retries += 1;
    if record.context.connectivity_retries > state.config.flow.connectivity_retry_limit {
        return escalate::escalate(state, record, EscalationReason::MultipleAttemptsFailed);
    }
    let (text, tokens) = question(step, lang);
    let reply = format!("{}\n\n{}", texts::conn_retry(lang), text);
    Ok(TurnOutput::with_buttons(
        reply,
        buttons::make(Stage::ConnectivityFlow, tokens, lang),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ButtonToken as B;
    use ConnectivityStep::*;

    #[test]
    fn ordered_path_reaches_power_cycle() {
        let mut step = WifiOrWired;
        for token in [B::Wifi, B::Notebook, B::Yes, B::No, B::OneBox, B::LightsOk] {
            step = advance(step, token).expect("path should advance");
        }
        assert_eq!(step, PowerCycle);
    }

    #[test]
    fn ssid_missing_jumps_to_power_cycle() {
        assert_eq!(advance(SsidVisible, B::No), Some(PowerCycle));
    }

    #[test]
    fn wrong_button_for_step_does_not_advance() {
        assert_eq!(advance(WifiOrWired, B::Yes), None);
        assert_eq!(advance(Lights, B::Wifi), None);
    }

    #[test]
    fn every_step_has_buttons_within_the_stage_contract() {
        let allowed = Stage::ConnectivityFlow.spec().allowed;
        for step in [
            WifiOrWired,
            NotebookOrDesktop,
            SsidVisible,
            AnotherDeviceOnline,
            OneBoxOrTwo,
            Lights,
            PowerCycle,
        ] {
            let (_, tokens) = question(step, Language::EsAr);
            assert!(tokens.iter().all(|t| allowed.contains(t)), "{step:?}");
            assert!(tokens.len() <= 4);
        }
    }
}
