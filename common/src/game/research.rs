//! Per-player research: bulb accumulation and tech unlocking.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    game::{
        error::{GameError, GameResult},
        PlayerId,
    },
    ruleset::Ruleset,
};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PlayerResearch {
    pub current_tech: Option<String>,
    pub bulbs_accumulated: u32,
    pub researched: BTreeSet<String>,
}

/// What `add_research_points` reports back
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResearchProgress {
    pub completed: Vec<String>,
    pub bulbs_accumulated: u32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ResearchManager {
    players: BTreeMap<PlayerId, PlayerResearch>,
}

impl ResearchManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_player(&mut self, player: PlayerId) {
        self.players.entry(player).or_default();
    }

    pub fn player(&self, player: PlayerId) -> Option<&PlayerResearch> {
        self.players.get(&player)
    }

    fn player_mut(&mut self, player: PlayerId) -> GameResult<&mut PlayerResearch> {
        self.players.get_mut(&player).ok_or(GameError::UnknownId {
            kind: "player",
            id: player.to_string(),
        })
    }

    /// Techs the player could start researching right now
    pub fn available_techs(&self, ruleset: &Ruleset, player: PlayerId) -> Vec<String> {
        let Some(state) = self.players.get(&player) else {
            return Vec::new();
        };
        ruleset
            .techs()
            .iter()
            .filter(|t| !state.researched.contains(&t.id))
            .filter(|t| t.prereqs.iter().all(|p| state.researched.contains(p)))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Choose what to research next
    pub fn set_current_research(
        &mut self,
        ruleset: &Ruleset,
        player: PlayerId,
        tech_id: &str,
    ) -> GameResult<()> {
        let tech = ruleset.tech(tech_id)?;

        let state = self.player_mut(player)?;
        if state.researched.contains(tech_id) {
            return Err(GameError::AlreadyResearched {
                tech: tech_id.to_owned(),
            });
        }
        if !tech.prereqs.iter().all(|p| state.researched.contains(p)) {
            return Err(GameError::PrereqNotMet {
                tech: tech_id.to_owned(),
            });
        }

        state.current_tech = Some(tech_id.to_owned());
        Ok(())
    }

    /// Accumulate bulbs toward the current tech. On completion the tech is
    /// recorded, its cost deducted, and `current_tech` cleared pending the
    /// player's next selection; leftover bulbs carry over.
    pub fn add_research_points(
        &mut self,
        ruleset: &Ruleset,
        player: PlayerId,
        bulbs: u32,
    ) -> GameResult<ResearchProgress> {
        // Resolve costs before mutating
        let current_cost = {
            let state = self.player_mut(player)?;
            match &state.current_tech {
                Some(tech_id) => Some(ruleset.tech(tech_id)?.cost),
                None => None,
            }
        };

        let state = self.player_mut(player)?;
        state.bulbs_accumulated += bulbs;

        let mut completed = Vec::new();
        if let (Some(cost), Some(tech_id)) = (current_cost, state.current_tech.clone()) {
            if state.bulbs_accumulated >= cost {
                state.bulbs_accumulated -= cost;
                state.researched.insert(tech_id.clone());
                state.current_tech = None;
                completed.push(tech_id);
            }
        }

        Ok(ResearchProgress {
            completed,
            bulbs_accumulated: state.bulbs_accumulated,
        })
    }

    /// Whether the player has researched the tech (techs never un-research)
    pub fn has_tech(&self, player: PlayerId, tech_id: &str) -> bool {
        self.players
            .get(&player)
            .map(|s| s.researched.contains(tech_id))
            .unwrap_or(false)
    }

    pub fn load_player(&mut self, player: PlayerId, state: PlayerResearch) {
        self.players.insert(player, state);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn setup() -> (std::sync::Arc<Ruleset>, ResearchManager) {
        let ruleset = Ruleset::load("classic").unwrap();
        let mut research = ResearchManager::new();
        research.ensure_player(0);
        (ruleset, research)
    }

    #[test]
    fn test_prereqs_gate_selection() {
        let (ruleset, mut research) = setup();

        // Writing needs alphabet
        let err = research
            .set_current_research(&ruleset, 0, "writing")
            .unwrap_err();
        assert_eq!(err.code(), "PrereqNotMet");

        research
            .set_current_research(&ruleset, 0, "alphabet")
            .unwrap();

        let err = research
            .set_current_research(&ruleset, 0, "perpetual_motion")
            .unwrap_err();
        assert_eq!(err.code(), "UnknownId");
    }

    #[test]
    fn test_completion_and_carry_over() {
        let (ruleset, mut research) = setup();
        research
            .set_current_research(&ruleset, 0, "alphabet")
            .unwrap();

        // Alphabet costs 10; feed 7 then 8
        let progress = research.add_research_points(&ruleset, 0, 7).unwrap();
        assert!(progress.completed.is_empty());
        assert_eq!(progress.bulbs_accumulated, 7);

        let progress = research.add_research_points(&ruleset, 0, 8).unwrap();
        assert_eq!(progress.completed, vec!["alphabet".to_owned()]);
        assert_eq!(progress.bulbs_accumulated, 5);

        let state = research.player(0).unwrap();
        assert!(state.researched.contains("alphabet"));
        assert_eq!(state.current_tech, None);

        // Completed techs never leave the set
        let err = research
            .set_current_research(&ruleset, 0, "alphabet")
            .unwrap_err();
        assert_eq!(err.code(), "AlreadyResearched");

        // Writing is now selectable and the carried bulbs still count
        research
            .set_current_research(&ruleset, 0, "writing")
            .unwrap();
        let progress = research.add_research_points(&ruleset, 0, 15).unwrap();
        assert_eq!(progress.completed, vec!["writing".to_owned()]);
        assert_eq!(progress.bulbs_accumulated, 0);
    }

    #[test]
    fn test_available_techs() {
        let (ruleset, mut research) = setup();

        let available = research.available_techs(&ruleset, 0);
        assert!(available.contains(&"alphabet".to_owned()));
        assert!(available.contains(&"pottery".to_owned()));
        assert!(!available.contains(&"writing".to_owned()));

        research
            .set_current_research(&ruleset, 0, "alphabet")
            .unwrap();
        research.add_research_points(&ruleset, 0, 10).unwrap();

        let available = research.available_techs(&ruleset, 0);
        assert!(available.contains(&"writing".to_owned()));
        assert!(!available.contains(&"alphabet".to_owned()));

        // Invariant: prereqs of anything available are already researched
        let state = research.player(0).unwrap();
        for tech_id in &available {
            for prereq in &ruleset.tech(tech_id).unwrap().prereqs {
                assert!(state.researched.contains(prereq));
            }
        }
    }

    #[test]
    fn test_bulbs_without_selection_accumulate() {
        let (ruleset, mut research) = setup();
        let progress = research.add_research_points(&ruleset, 0, 12).unwrap();
        assert!(progress.completed.is_empty());
        assert_eq!(progress.bulbs_accumulated, 12);
    }
}
