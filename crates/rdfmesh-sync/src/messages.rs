//! Gossip protocol message types and their wire envelope.
//!
//! Every message travels inside an [`Envelope`]: a performative, an
//! ontology tag naming the message kind, a language tag, and a JSON body.
//! Peers ignore envelopes whose ontology they do not recognize.

use serde::{Deserialize, Serialize};

use rdfmesh_core::{AuthorId, Revision, RevisionHash};

use crate::error::DecodeError;

/// Ontology tag for peer status announcements.
pub const ONTOLOGY_STATUS: &str = "status";
/// Ontology tag for revision propagation.
pub const ONTOLOGY_REVISION: &str = "revision";
/// Ontology tag for revision fetch requests.
pub const ONTOLOGY_REVISION_REQUEST: &str = "revision_request";

/// The only body language this protocol speaks.
pub const LANGUAGE_JSON: &str = "json";

/// Speech-act class of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performative {
    Inform,
    Request,
}

/// The unit of transport: routable wire message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub performative: Performative,
    pub ontology: String,
    pub language: String,
    pub body: serde_json::Value,
}

/// Body of a status announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    /// The sender's author identity.
    pub uuid: AuthorId,
    /// The sender's current head, if it has one.
    pub latest_revision: Option<RevisionHash>,
    /// Free-form liveness tag.
    pub status: String,
}

/// Body of a revision fetch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    pub hash: RevisionHash,
}

/// A decoded protocol message.
#[derive(Debug, Clone)]
pub enum PeerMessage {
    Status(StatusBody),
    Revision(Revision),
    RevisionRequest(RequestBody),
}

impl PeerMessage {
    /// The ontology tag this message travels under.
    pub fn ontology(&self) -> &'static str {
        match self {
            PeerMessage::Status(_) => ONTOLOGY_STATUS,
            PeerMessage::Revision(_) => ONTOLOGY_REVISION,
            PeerMessage::RevisionRequest(_) => ONTOLOGY_REVISION_REQUEST,
        }
    }

    fn performative(&self) -> Performative {
        match self {
            PeerMessage::Status(_) | PeerMessage::Revision(_) => Performative::Inform,
            PeerMessage::RevisionRequest(_) => Performative::Request,
        }
    }

    /// Encode into a wire envelope.
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let body = match self {
            PeerMessage::Status(body) => serde_json::to_value(body)?,
            PeerMessage::Revision(revision) => serde_json::to_value(revision)?,
            PeerMessage::RevisionRequest(body) => serde_json::to_value(body)?,
        };
        Ok(Envelope {
            performative: self.performative(),
            ontology: self.ontology().to_owned(),
            language: LANGUAGE_JSON.to_owned(),
            body,
        })
    }

    /// Decode a wire envelope.
    ///
    /// Unknown ontologies and malformed bodies are reported as
    /// [`DecodeError`]; the caller drops such traffic quietly.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, DecodeError> {
        match envelope.ontology.as_str() {
            ONTOLOGY_STATUS => Ok(PeerMessage::Status(serde_json::from_value(
                envelope.body.clone(),
            )?)),
            ONTOLOGY_REVISION => Ok(PeerMessage::Revision(serde_json::from_value(
                envelope.body.clone(),
            )?)),
            ONTOLOGY_REVISION_REQUEST => Ok(PeerMessage::RevisionRequest(
                serde_json::from_value(envelope.body.clone())?,
            )),
            other => Err(DecodeError::UnknownOntology(other.to_owned())),
        }
    }
}
