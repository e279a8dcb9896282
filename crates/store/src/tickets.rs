//! Ticket store and contact deep-link builder.
//!
//! Tickets are append-only, one per conversation, keyed by the conversation
//! ID. Creation is idempotent: a second escalation returns the ticket the
//! first one wrote.

use std::path::{Path, PathBuf};

use tb_domain::config::EscalationConfig;
use tb_domain::conversation::ConversationId;
use tb_domain::ticket::Ticket;
use tb_domain::trace::TraceEvent;
use tb_domain::{Error, Result};

/// Write attempts before surfacing a storage failure.
const WRITE_ATTEMPTS: u32 = 3;

pub struct TicketStore {
    dir: PathBuf,
}

impl TicketStore {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: &ConversationId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    pub fn load(&self, id: &ConversationId) -> Result<Option<Ticket>> {
        let path = self.path_for(id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let ticket = serde_json::from_str(&raw)
            .map_err(|_| Error::CorruptedRecord(format!("ticket {}", id.as_str())))?;
        Ok(Some(ticket))
    }

    /// Persist the ticket unless one already exists; returns the winner
    /// either way.
    pub fn create_if_absent(&self, ticket: Ticket) -> Result<Ticket> {
        if let Some(existing) = self.load(&ticket.conversation_id)? {
            return Ok(existing);
        }

        let path = self.path_for(&ticket.conversation_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&ticket)?;

        let mut last_err = None;
        for _ in 0..WRITE_ATTEMPTS {
            match std::fs::write(&tmp, &json).and_then(|_| std::fs::rename(&tmp, &path)) {
                Ok(()) => {
                    TraceEvent::TicketCreated {
                        conversation_id: ticket.conversation_id.as_str().to_string(),
                        reason: ticket.reason.as_str().to_string(),
                    }
                    .emit();
                    return Ok(ticket);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(Error::Io)
            .unwrap_or_else(|| Error::Other("ticket write failed".into())))
    }
}

/// Build the out-of-band contact deep-link:
/// `<base><number>?text=<urlencoded "Hola, soy <name>. Conversación <ID>. Problema: <summary>">`.
pub fn build_contact_url(
    cfg: &EscalationConfig,
    masked_name: &str,
    id: &ConversationId,
    summary: &str,
) -> String {
    let body = format!(
        "Hola, soy {masked_name}. Conversación {}. Problema: {summary}",
        id.as_str()
    );
    let encoded: String = url::form_urlencoded::byte_serialize(body.as_bytes()).collect();
    format!("{}{}?text={encoded}", cfg.contact_url_base, cfg.contact_number)
}
