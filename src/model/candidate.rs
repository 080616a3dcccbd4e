use serde::{Deserialize, Serialize};

pub type CandidateId = String;

/// A candidate on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub party: String,
    pub region: String,
}

impl Candidate {
    fn new(id: &str, name: &str, party: &str, region: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            party: party.to_string(),
            region: region.to_string(),
        }
    }
}

/// The candidates standing in a single election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    candidates: Vec<Candidate>,
}

impl Roster {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|candidate| candidate.id == id)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

/// The national roster used when none is configured.
pub fn default_candidates() -> Vec<Candidate> {
    vec![
        Candidate::new("c-aziz", "Aziz Akhannouch", "National Rally of Independents", "Rabat-Salé-Kénitra"),
        Candidate::new("c-naima", "Naima Benyahia", "Social Democratic Front", "Casablanca-Settat"),
        Candidate::new("c-hassan", "Hassan Amrani", "Istiqlal", "Marrakesh-Safi"),
        Candidate::new("c-salma", "Salma El Idrissi", "Authenticity and Modernity Party", "Fès-Meknès"),
        Candidate::new("c-youssef", "Youssef Marzouk", "Green Movement", "Tanger-Tétouan-Al Hoceïma"),
        Candidate::new("c-farida", "Farida Lahlou", "Women Equality Front", "Souss-Massa"),
        Candidate::new("c-omar", "Omar Joud", "Democratic Modernist", "Béni Mellal-Khénifra"),
        Candidate::new("c-ines", "Inès Saidi", "Youth Pulse", "Drâa-Tafilalet"),
    ]
}
