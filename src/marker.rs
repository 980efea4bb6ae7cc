//! Closed set of structural markers recognised in a transcript.
//!
//! Element names are mapped once to a [`Marker`]; the parser dispatches on
//! the enum. Unrecognised names map to [`Marker::Other`] and are ignored.

/// A recognised transcript element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// `<rede>`: one speech.
    Speech,
    /// `<redner>`: speaker reference carrying the speaker id.
    Speaker,
    /// `<vorname>`
    FirstName,
    /// `<nachname>`
    LastName,
    /// `<fraktion>`
    Party,
    /// `<tagesordnungspunkt>`: agenda entry.
    AgendaItem,
    /// `<ivz-block-titel>`
    AgendaTitle,
    /// `<ivz-eintrag-inhalt>`
    AgendaContent,
    /// `<kopfdaten>`: session header.
    Header,
    /// `<datum>`
    Date,
    /// `<wahlperiode>`
    ElectoralPeriod,
    /// `<sitzungsnr>`
    SessionNumber,
    /// `<ort>`
    Place,
    /// `<sitzungstitel>`
    SessionTitle,
    /// `<kommentar>`: interjection.
    Comment,
    /// `<p>`: paragraph.
    Paragraph,
    Other,
}

impl Marker {
    pub const RECOGNISED: [Marker; 16] = [
        Marker::Speech,
        Marker::Speaker,
        Marker::FirstName,
        Marker::LastName,
        Marker::Party,
        Marker::AgendaItem,
        Marker::AgendaTitle,
        Marker::AgendaContent,
        Marker::Header,
        Marker::Date,
        Marker::ElectoralPeriod,
        Marker::SessionNumber,
        Marker::Place,
        Marker::SessionTitle,
        Marker::Comment,
        Marker::Paragraph,
    ];

    pub fn from_name(name: &[u8]) -> Self {
        match name {
            b"rede" => Marker::Speech,
            b"redner" => Marker::Speaker,
            b"vorname" => Marker::FirstName,
            b"nachname" => Marker::LastName,
            b"fraktion" => Marker::Party,
            b"tagesordnungspunkt" => Marker::AgendaItem,
            b"ivz-block-titel" => Marker::AgendaTitle,
            b"ivz-eintrag-inhalt" => Marker::AgendaContent,
            b"kopfdaten" => Marker::Header,
            b"datum" => Marker::Date,
            b"wahlperiode" => Marker::ElectoralPeriod,
            b"sitzungsnr" => Marker::SessionNumber,
            b"ort" => Marker::Place,
            b"sitzungstitel" => Marker::SessionTitle,
            b"kommentar" => Marker::Comment,
            b"p" => Marker::Paragraph,
            _ => Marker::Other,
        }
    }

    /// Element name for this marker, `None` for [`Marker::Other`].
    pub fn element_name(&self) -> Option<&'static str> {
        let name = match self {
            Marker::Speech => "rede",
            Marker::Speaker => "redner",
            Marker::FirstName => "vorname",
            Marker::LastName => "nachname",
            Marker::Party => "fraktion",
            Marker::AgendaItem => "tagesordnungspunkt",
            Marker::AgendaTitle => "ivz-block-titel",
            Marker::AgendaContent => "ivz-eintrag-inhalt",
            Marker::Header => "kopfdaten",
            Marker::Date => "datum",
            Marker::ElectoralPeriod => "wahlperiode",
            Marker::SessionNumber => "sitzungsnr",
            Marker::Place => "ort",
            Marker::SessionTitle => "sitzungstitel",
            Marker::Comment => "kommentar",
            Marker::Paragraph => "p",
            Marker::Other => return None,
        };
        Some(name)
    }

    /// True for markers whose close writes into the session header.
    pub fn is_header_field(&self) -> bool {
        matches!(
            self,
            Marker::Date
                | Marker::ElectoralPeriod
                | Marker::SessionNumber
                | Marker::Place
                | Marker::SessionTitle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_marker_round_trips_through_its_element_name() {
        let table = [
            ("rede", Marker::Speech),
            ("redner", Marker::Speaker),
            ("vorname", Marker::FirstName),
            ("nachname", Marker::LastName),
            ("fraktion", Marker::Party),
            ("tagesordnungspunkt", Marker::AgendaItem),
            ("ivz-block-titel", Marker::AgendaTitle),
            ("ivz-eintrag-inhalt", Marker::AgendaContent),
            ("kopfdaten", Marker::Header),
            ("datum", Marker::Date),
            ("wahlperiode", Marker::ElectoralPeriod),
            ("sitzungsnr", Marker::SessionNumber),
            ("ort", Marker::Place),
            ("sitzungstitel", Marker::SessionTitle),
            ("kommentar", Marker::Comment),
            ("p", Marker::Paragraph),
        ];
        assert_eq!(table.len(), Marker::RECOGNISED.len());
        for (name, marker) in table {
            assert_eq!(Marker::from_name(name.as_bytes()), marker, "{}", name);
            assert_eq!(marker.element_name(), Some(name));
            assert!(Marker::RECOGNISED.contains(&marker));
        }
    }

    #[test]
    fn unknown_names_are_other() {
        for name in ["", "Rede", "sitzungsverlauf", "name", "P", "dbtplenarprotokoll"] {
            assert_eq!(Marker::from_name(name.as_bytes()), Marker::Other);
        }
        assert_eq!(Marker::Other.element_name(), None);
    }

    #[test]
    fn header_fields() {
        let fields: Vec<_> = Marker::RECOGNISED
            .iter()
            .filter(|m| m.is_header_field())
            .collect();
        assert_eq!(fields.len(), 5);
        assert!(!Marker::Header.is_header_field());
    }
}
