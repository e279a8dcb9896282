//! Localized canned texts and button labels.
//!
//! Everything the bot can say without the LLM lives here, keyed by the
//! conversation language. es-AR is the house voice (voseo); English covers
//! the second widget locale.

use tb_domain::conversation::Language;
use tb_domain::stage::{ButtonToken, Stage};

use Language::{En, EsAr};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Button labels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn button_label(token: ButtonToken, lang: Language) -> &'static str {
    use ButtonToken::*;
    match lang {
        EsAr => match token {
            ConsentYes => "Sí, acepto",
            ConsentNo => "No, gracias",
            LangEsAr => "Español (Argentina)",
            LangEn => "English",
            UserLevelBasic => "Básico",
            UserLevelIntermediate => "Intermedio",
            UserLevelAdvanced => "Avanzado",
            DeviceMain => "Mi computadora",
            DeviceExternal => "Un periférico",
            Notebook => "Notebook",
            Desktop => "PC de escritorio",
            Problema => "Contarte mi problema",
            Wifi => "WiFi",
            Wired => "Por cable",
            Yes => "Sí",
            No => "No",
            OneBox => "Un solo equipo",
            TwoBoxes => "Dos equipos",
            LightsOk => "Luces encendidas",
            LightsOff => "Luces apagadas o raras",
            Solved => "¡Funcionó!",
            Persist => "Sigue igual",
            AdvancedTests => "Pruebas avanzadas",
            ConnectTech => "Hablar con un técnico",
            RiskContinue => "Continuar igual",
            RiskCancel => "Mejor no",
            ModeGuided => "Guiame paso a paso",
            ModeFree => "Prefiero ir a mi ritmo",
            DepthQuick => "Solo resolverlo",
            DepthDeep => "Quiero entender qué pasa",
            RoleSelf => "Lo hago yo",
            RoleAssisted => "Me ayuda alguien",
            FeedbackPositive => "👍 Me sirvió",
            FeedbackNegative => "👎 No me sirvió",
            Resume => "Retomar donde estaba",
            Close => "Cerrar conversación",
        },
        En => match token {
            ConsentYes => "Yes, I agree",
            ConsentNo => "No, thanks",
            LangEsAr => "Español (Argentina)",
            LangEn => "English",
            UserLevelBasic => "Basic",
            UserLevelIntermediate => "Intermediate",
            UserLevelAdvanced => "Advanced",
            DeviceMain => "My computer",
            DeviceExternal => "A peripheral",
            Notebook => "Notebook",
            Desktop => "Desktop PC",
            Problema => "Tell you my problem",
            Wifi => "WiFi",
            Wired => "Wired",
            Yes => "Yes",
            No => "No",
            OneBox => "One box",
            TwoBoxes => "Two boxes",
            LightsOk => "Lights on",
            LightsOff => "Lights off or odd",
            Solved => "It worked!",
            Persist => "Still the same",
            AdvancedTests => "Advanced tests",
            ConnectTech => "Talk to a technician",
            RiskContinue => "Continue anyway",
            RiskCancel => "Better not",
            ModeGuided => "Guide me step by step",
            ModeFree => "I'll go at my own pace",
            DepthQuick => "Just fix it",
            DepthDeep => "I want to understand it",
            RoleSelf => "I'll do it myself",
            RoleAssisted => "Someone helps me",
            FeedbackPositive => "👍 It helped",
            FeedbackNegative => "👎 It didn't help",
            Resume => "Pick up where I was",
            Close => "Close conversation",
        },
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Onboarding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn greeting(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "¡Hola! 👋 Soy el asistente técnico. Antes de empezar necesito tu \
             consentimiento: guardo esta conversación para poder ayudarte mejor \
             y para que un técnico pueda retomarla si hace falta. ¿Estás de acuerdo?"
        }
        En => {
            "Hi! 👋 I'm the tech-support assistant. Before we start I need your \
             consent: I keep this conversation so I can help you better and so a \
             technician can pick it up if needed. Is that OK?"
        }
    }
}

pub fn consent_declined(lang: Language) -> &'static str {
    match lang {
        EsAr => "Entendido, no hay problema. Cuando quieras, acá voy a estar. ¡Que andes bien! 🙂",
        En => "Understood, no problem. I'll be here whenever you need me. Take care! 🙂",
    }
}

pub fn ask_language(lang: Language) -> &'static str {
    match lang {
        EsAr => "¡Perfecto! ¿En qué idioma preferís que hablemos?",
        En => "Great! Which language would you like to use?",
    }
}

pub fn id_assigned(lang: Language, id: &str) -> String {
    match lang {
        EsAr => format!(
            "Listo ✅. Tu conversación quedó registrada con el código {id}. \
             Guardalo por si querés retomarla más adelante.\n\n¿Cómo te llamás?"
        ),
        En => format!(
            "Done ✅. Your conversation is registered under code {id}. \
             Keep it in case you want to resume later.\n\nWhat's your name?"
        ),
    }
}

pub fn ask_name_again(lang: Language) -> &'static str {
    match lang {
        EsAr => "No me quedó claro tu nombre 😅. ¿Me lo repetís?",
        En => "I didn't quite catch your name 😅. Could you repeat it?",
    }
}

pub fn ask_user_level(lang: Language, name: &str) -> String {
    match lang {
        EsAr => format!(
            "¡Un gusto, {name}! Para adaptar las explicaciones: ¿cuánta \
             experiencia tenés con tecnología?"
        ),
        En => format!(
            "Nice to meet you, {name}! So I can adapt my explanations: how \
             much experience do you have with technology?"
        ),
    }
}

pub fn ask_device_category(lang: Language) -> &'static str {
    match lang {
        EsAr => "¿El problema es con tu computadora o con algún periférico (impresora, monitor, etc.)?",
        En => "Is the problem with your computer or with a peripheral (printer, monitor, etc.)?",
    }
}

pub fn ask_device_type_main(lang: Language) -> &'static str {
    match lang {
        EsAr => "¿Qué tipo de equipo es?",
        En => "What kind of computer is it?",
    }
}

pub fn ask_device_type_external(lang: Language) -> &'static str {
    match lang {
        EsAr => "Contame qué periférico es (por ejemplo: impresora, monitor, teclado).",
        En => "Tell me which peripheral it is (for example: printer, monitor, keyboard).",
    }
}

pub fn ask_problem(lang: Language) -> &'static str {
    match lang {
        EsAr => "Perfecto. Ahora contame con tus palabras: ¿qué problema estás teniendo?",
        En => "Perfect. Now tell me in your own words: what problem are you having?",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Clarification / guided story / emotional beats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn clarification_fallback(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Quiero asegurarme de entenderte bien. ¿Me contás un poco más? Por \
             ejemplo: ¿qué equipo es y qué ves en la pantalla cuando falla?"
        }
        En => {
            "I want to make sure I understand. Could you tell me a bit more? For \
             example: which device is it, and what do you see when it fails?"
        }
    }
}

pub fn story_question(lang: Language, index: usize) -> &'static str {
    match lang {
        EsAr => match index {
            0 => {
                "Vamos con calma, sin apuro 🙂. Primero: ¿qué estabas haciendo \
                 con el equipo cuando apareció el problema?"
            }
            1 => "Bien. ¿Y qué fue exactamente lo que viste o escuchaste cuando falló?",
            _ => "Última pregunta: ¿desde cuándo pasa esto? ¿Fue de golpe o de a poco?",
        },
        En => match index {
            0 => {
                "Let's take it slowly, no rush 🙂. First: what were you doing \
                 with the device when the problem appeared?"
            }
            1 => "Good. And what exactly did you see or hear when it failed?",
            _ => "Last question: since when does this happen? Did it start suddenly or gradually?",
        },
    }
}

pub fn emotional_release(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Te entiendo, estas cosas sacan de quicio a cualquiera 😮‍💨. \
             Respirá hondo, que lo vamos a resolver juntos. Cuando estés listo, \
             contame el problema con tus palabras."
        }
        En => {
            "I get it, these things would drive anyone up the wall 😮‍💨. \
             Take a breath, we'll sort it out together. Whenever you're ready, \
             tell me about the problem in your own words."
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Risk gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn risk_summary(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "⚠️ Ojo: lo que sigue puede modificar datos o la configuración de tu \
             equipo. Si algo sale mal podrías perder información, así que antes \
             de seguir hacé una copia de lo importante. ¿Querés continuar?"
        }
        En => {
            "⚠️ Heads up: the next steps can modify data or your device's \
             configuration. If something goes wrong you could lose information, \
             so back up anything important first. Do you want to continue?"
        }
    }
}

pub fn risk_cancelled(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Buena decisión, mejor ir a lo seguro 👍. Contame de nuevo qué \
             necesitás y buscamos otro camino."
        }
        En => {
            "Good call, better safe than sorry 👍. Tell me again what you need \
             and we'll find another way."
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connectivity flow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn conn_wifi_or_wired(lang: Language) -> &'static str {
    match lang {
        EsAr => "Vamos a revisar tu conexión 🔎. ¿Te conectás por WiFi o por cable de red?",
        En => "Let's check your connection 🔎. Do you connect over WiFi or a network cable?",
    }
}

pub fn conn_notebook_or_desktop(lang: Language) -> &'static str {
    match lang {
        EsAr => "¿El equipo que se queda sin internet es una notebook o una PC de escritorio?",
        En => "Is the device losing internet a notebook or a desktop PC?",
    }
}

pub fn conn_ssid_visible(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Abrí la lista de redes WiFi del equipo. ¿Aparece el nombre de tu \
             red (el SSID) en la lista?"
        }
        En => {
            "Open the WiFi list on your device. Does your network's name (the \
             SSID) show up in the list?"
        }
    }
}

pub fn conn_another_device(lang: Language) -> &'static str {
    match lang {
        EsAr => "¿Otro dispositivo (el celular, por ejemplo) tiene internet en la misma red?",
        En => "Does another device (your phone, for example) have internet on the same network?",
    }
}

pub fn conn_one_box_or_two(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Vamos al equipo que te da internet. ¿Tenés un solo aparato \
             (módem-router todo en uno) o dos cajas separadas?"
        }
        En => {
            "Let's look at the equipment that provides your internet. Do you \
             have a single box (all-in-one modem-router) or two separate boxes?"
        }
    }
}

pub fn conn_lights(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Mirá las luces del equipo: ¿están encendidas normalmente (verdes o \
             azules, estables o titilando) o ves algo raro (apagadas, rojas)?"
        }
        En => {
            "Look at the lights on the box: are they on as usual (green or blue, \
             steady or blinking) or is something off (dark, red)?"
        }
    }
}

pub fn conn_power_cycle(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Hagamos un reinicio ordenado 🔌:\n\
             1. Desenchufá el módem (y el router si tenés dos cajas).\n\
             2. Esperá 30 segundos.\n\
             3. Enchufá primero el módem y esperá a que se estabilicen las luces.\n\
             4. Enchufá el router y esperá un par de minutos.\n\
             5. Probá internet de nuevo.\n\n¿Cómo fue?"
        }
        En => {
            "Let's do an ordered power cycle 🔌:\n\
             1. Unplug the modem (and the router if you have two boxes).\n\
             2. Wait 30 seconds.\n\
             3. Plug the modem back in first and wait for its lights to settle.\n\
             4. Plug in the router and wait a couple of minutes.\n\
             5. Try the internet again.\n\nHow did it go?"
        }
    }
}

pub fn conn_alt_step(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Probemos otra cosa entonces: revisá que el cable de red esté bien \
             enchufado en ambos extremos (o que el WiFi del equipo esté \
             activado y sin modo avión), y olvidate de la red y volvé a \
             conectarte ingresando la clave. ¿Mejoró?"
        }
        En => {
            "Let's try something else then: check that the network cable is \
             firmly plugged at both ends (or that WiFi is on and airplane mode \
             is off), then forget the network and rejoin it entering the \
             password. Any better?"
        }
    }
}

pub fn conn_retry(lang: Language) -> &'static str {
    match lang {
        EsAr => "Usá los botones de abajo así no nos perdemos 🙂.",
        En => "Please use the buttons below so we stay on track 🙂.",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diagnostic / installation fallbacks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canned single step used when the step generator times out or returns an
/// invalid document. One per LLM-governed stage.
pub fn fallback_step(stage: Stage, lang: Language) -> &'static str {
    match (stage, lang) {
        (Stage::InstallationStep, EsAr) => {
            "Mientras tanto, probemos lo básico: cerrá la instalación, reiniciá \
             el equipo y volvé a ejecutar el instalador como administrador. \
             ¿Cambió algo?"
        }
        (Stage::InstallationStep, En) => {
            "Meanwhile, let's try the basics: close the installer, restart the \
             device, and run the installer again as administrator. Any change?"
        }
        (Stage::AskProblem | Stage::AskProblemClarification, EsAr) => {
            "Para orientarme mejor: ¿el problema es con tu computadora o con \
             algún aparato conectado a ella?"
        }
        (Stage::AskProblem | Stage::AskProblemClarification, En) => {
            "To point me in the right direction: is the problem with your \
             computer or with a device connected to it?"
        }
        (_, EsAr) => {
            "Probemos algo simple primero: reiniciá el equipo por completo \
             (apagar, esperar 10 segundos, prender) y fijate si el problema \
             sigue. ¿Cómo fue?"
        }
        (_, En) => {
            "Let's try something simple first: fully restart the device (power \
             off, wait 10 seconds, power on) and check whether the problem \
             remains. How did it go?"
        }
    }
}

pub fn solved_reply(lang: Language) -> &'static str {
    match lang {
        EsAr => "¡Excelente! 🎉 Me alegra que se haya resuelto. ¿Te sirvió la ayuda?",
        En => "Excellent! 🎉 Glad it's sorted. Was this help useful?",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Escalation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn escalated(lang: Language, contact_url: &str) -> String {
    match lang {
        EsAr => format!(
            "Esto ya merece manos expertas 🧑‍🔧. Te dejo el contacto directo de \
             un técnico; al tocar el enlace se abre el chat con tus datos ya \
             cargados:\n\n{contact_url}\n\nLa conversación queda guardada para \
             que el técnico la pueda leer."
        ),
        En => format!(
            "This deserves expert hands 🧑‍🔧. Here's the direct contact for a \
             technician; tapping the link opens the chat with your details \
             pre-filled:\n\n{contact_url}\n\nThe conversation stays saved so \
             the technician can read it."
        ),
    }
}

pub fn already_escalated(lang: Language, contact_url: &str) -> String {
    match lang {
        EsAr => format!(
            "Ya derivamos tu caso a un técnico 😉. Te repito el contacto por \
             las dudas:\n\n{contact_url}"
        ),
        En => format!(
            "Your case is already with a technician 😉. Here's the contact \
             again just in case:\n\n{contact_url}"
        ),
    }
}

pub fn risk_escalated_preamble(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "Pará ahí mismo, por favor 🙏: desenchufá el equipo y no lo vuelvas \
             a encender. Con olores a quemado, líquidos o chispas no se juega."
        }
        En => {
            "Please stop right there 🙏: unplug the device and don't power it \
             back on. Burning smells, liquids, or sparks are not to be played with."
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resume / feedback / closing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn resume_summary(lang: Language, device: &str, problem: &str) -> String {
    match lang {
        EsAr => format!(
            "¡Volviste! 👋 Te pongo al día: estábamos viendo un problema con \
             {device} ({problem}). ¿Retomamos donde quedamos?"
        ),
        En => format!(
            "Welcome back! 👋 Quick recap: we were looking at a problem with \
             {device} ({problem}). Shall we pick up where we left off?"
        ),
    }
}

pub fn resume_no_context(lang: Language) -> &'static str {
    match lang {
        EsAr => "¡Volviste! 👋 ¿Retomamos la conversación o preferís contarme un problema nuevo?",
        En => "Welcome back! 👋 Shall we resume, or would you rather tell me about a new problem?",
    }
}

pub fn ask_interaction_mode(lang: Language) -> &'static str {
    match lang {
        EsAr => "Antes de seguir: ¿preferís que te guíe paso a paso o que te tire las ideas y avanzás vos?",
        En => "Before we go on: would you rather I guide you step by step, or give you the ideas and you run with them?",
    }
}

pub fn ask_learning_depth(lang: Language) -> &'static str {
    match lang {
        EsAr => "¿Querés solo resolverlo rápido o también entender qué está pasando?",
        En => "Do you want a quick fix only, or also to understand what's going on?",
    }
}

pub fn ask_executor_role(lang: Language) -> &'static str {
    match lang {
        EsAr => "¿Los pasos los vas a hacer vos, o hay alguien al lado que te ayuda?",
        En => "Will you be doing the steps yourself, or is someone there helping you?",
    }
}

pub fn advisory_fallback(lang: Language) -> &'static str {
    match lang {
        EsAr => {
            "¡Buena pregunta! Ahora mismo no te puedo dar una explicación \
             completa, pero anotala para el técnico si llegamos a derivar el \
             caso. ¿Seguimos con lo que estábamos?"
        }
        En => {
            "Good question! I can't give you a full explanation right now, but \
             note it down for the technician if we end up handing the case \
             over. Shall we continue where we were?"
        }
    }
}

pub fn feedback_thanks(lang: Language) -> &'static str {
    match lang {
        EsAr => "¡Gracias por contarme! Tu opinión ayuda a mejorar el servicio. ¡Hasta la próxima! 👋",
        En => "Thanks for letting me know! Your feedback helps improve the service. See you next time! 👋",
    }
}

pub fn closed(lang: Language) -> &'static str {
    match lang {
        EsAr => "Conversación cerrada. ¡Gracias por escribirnos! 👋",
        En => "Conversation closed. Thanks for reaching out! 👋",
    }
}

pub fn conversation_over(lang: Language) -> &'static str {
    match lang {
        EsAr => "Esta conversación ya terminó. Si necesitás ayuda de nuevo, iniciá una nueva desde el widget 🙂.",
        En => "This conversation has ended. If you need help again, start a new one from the widget 🙂.",
    }
}

pub fn use_buttons(lang: Language) -> &'static str {
    match lang {
        EsAr => "Elegí una de las opciones de abajo, por favor 🙂.",
        En => "Please pick one of the options below 🙂.",
    }
}
