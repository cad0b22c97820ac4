//! Protokoll-Frames fuer die Server→Client-Richtung
//!
//! Jedes Frame ist genau eine Textzeile. Die Client→Server-Richtung traegt
//! freien Text (Namenskandidat waehrend der Verhandlung, Chat-Zeile danach)
//! und wird deshalb nicht als Frame modelliert, sondern als rohe Zeile
//! gelesen. Einzige Ausnahme ist das Sentinel `EXIT`, das in beide
//! Richtungen laeuft.

use std::fmt;

/// Sentinel-Zeile fuer das geordnete Verbindungsende (beide Richtungen)
pub const EXIT_SENTINEL: &str = "EXIT";

/// Eine einzelne Protokollzeile, Server→Client
///
/// Die Roster-Uebertragung ist ein Frame-*Lauf*: `UserlistBegin`, dann ein
/// `RosterEintrag` pro Name, dann `UserlistEnd`. Aus Client-Sicht ist der
/// Lauf nicht atomar, die enthaltene Namensmenge entspricht aber einem
/// konsistenten Registry-Schnappschuss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Fordert den Client auf, einen Namenskandidaten zu senden
    SubmitName,
    /// Der zuletzt gesendete Kandidat wurde angenommen
    NameAccepted,
    /// Ein Client mit diesem Namen ist beigetreten
    NewUser(String),
    /// Beginn eines Roster-Laufs
    UserlistBegin,
    /// Ein Name innerhalb eines Roster-Laufs (nackte Zeile)
    RosterEintrag(String),
    /// Ende eines Roster-Laufs
    UserlistEnd,
    /// Broadcast-Chatnachricht eines benannten Clients
    Message { absender: String, text: String },
    /// Ein Client mit diesem Namen hat den Raum verlassen
    RemoveUser(String),
    /// Geordnetes Verbindungsende
    Exit,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::SubmitName => write!(f, "SUBMIT_NAME"),
            Frame::NameAccepted => write!(f, "NAME_ACCEPTED"),
            Frame::NewUser(name) => write!(f, "NEW_USER {name}"),
            Frame::UserlistBegin => write!(f, "USERLIST_BEGIN"),
            Frame::RosterEintrag(name) => write!(f, "{name}"),
            Frame::UserlistEnd => write!(f, "USERLIST_END"),
            Frame::Message { absender, text } => write!(f, "MESSAGE {absender}: {text}"),
            Frame::RemoveUser(name) => write!(f, "REMOVE_USER {name}"),
            Frame::Exit => write!(f, "{EXIT_SENTINEL}"),
        }
    }
}

impl Frame {
    /// Baut den vollstaendigen Frame-Lauf fuer einen Beitritt:
    /// `NEW_USER <name>` gefolgt vom kompletten Roster
    pub fn beitritts_lauf(name: &str, roster: &[String]) -> Vec<Frame> {
        let mut lauf = Vec::with_capacity(roster.len() + 3);
        lauf.push(Frame::NewUser(name.to_string()));
        roster_anfuegen(&mut lauf, roster);
        lauf
    }

    /// Baut den vollstaendigen Frame-Lauf fuer einen Abschied:
    /// `REMOVE_USER <name>` gefolgt vom verbleibenden Roster
    pub fn abschieds_lauf(name: &str, roster: &[String]) -> Vec<Frame> {
        let mut lauf = Vec::with_capacity(roster.len() + 3);
        lauf.push(Frame::RemoveUser(name.to_string()));
        roster_anfuegen(&mut lauf, roster);
        lauf
    }
}

fn roster_anfuegen(lauf: &mut Vec<Frame>, roster: &[String]) {
    lauf.push(Frame::UserlistBegin);
    for name in roster {
        lauf.push(Frame::RosterEintrag(name.clone()));
    }
    lauf.push(Frame::UserlistEnd);
}
