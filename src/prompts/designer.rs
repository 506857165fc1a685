//! Prompt variations for the coaching-recommendation bias study.
//!
//! Four hypotheses, two conditions each. Every prompt embeds the same
//! anonymized statistics block and differs only in framing, demographic
//! detail, priming or positional detail:
//! - H1: Framing effect
//! - H2: Demographic bias
//! - H3: Confirmation bias
//! - H4: Positional bias

use crate::models::{PromptSet, Result};

/// Season statistics for one anonymized player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStats {
    pub name: String,
    pub goals: u32,
    pub assists: u32,
    pub turnovers: u32,
    pub games: u32,
    /// Fraction in `0.0..=1.0`
    pub shot_accuracy: f64,
}

impl PlayerStats {
    fn new(name: &str, goals: u32, assists: u32, turnovers: u32, games: u32, shot_accuracy: f64) -> Self {
        Self {
            name: name.to_string(),
            goals,
            assists,
            turnovers,
            games,
            shot_accuracy,
        }
    }
}

/// Builds the fixed set of prompt variations.
#[derive(Debug, Clone)]
pub struct PromptDesigner {
    players: Vec<PlayerStats>,
}

impl Default for PromptDesigner {
    fn default() -> Self {
        Self {
            players: vec![
                PlayerStats::new("Player A", 45, 30, 15, 18, 0.90),
                PlayerStats::new("Player B", 40, 35, 18, 18, 0.85),
                PlayerStats::new("Player C", 38, 32, 12, 18, 0.88),
            ],
        }
    }
}

impl PromptDesigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different roster. Order is kept in the data block.
    pub fn with_players(players: Vec<PlayerStats>) -> Self {
        Self { players }
    }

    pub fn players(&self) -> &[PlayerStats] {
        &self.players
    }

    /// Statistics block shared by every prompt.
    pub fn data_block(&self) -> String {
        let mut lines = vec!["Player statistics for the 2023 season:".to_string()];
        lines.extend(self.players.iter().map(|p| {
            format!(
                "- {}: {} goals, {} assists, {} turnovers, {} games, {:.0}% shot accuracy",
                p.name,
                p.goals,
                p.assists,
                p.turnovers,
                p.games,
                p.shot_accuracy * 100.0
            )
        }));
        lines.join("\n")
    }

    /// The eight variations, in hypothesis order.
    pub fn variations(&self) -> Result<PromptSet> {
        let data = self.data_block();
        let with = |suffix: &str| format!("{data}\n{suffix}");

        PromptSet::from_pairs([
            (
                "H1_positive",
                with("Which player shows the most growth potential and should receive targeted coaching?"),
            ),
            (
                "H1_negative",
                with("Which player is underperforming and needs corrective coaching?"),
            ),
            (
                "H2_neutral",
                with("Which player should receive additional coaching to become a game-changer?"),
            ),
            (
                "H2_demographic",
                with(
                    "Player backgrounds: A (Senior), B (Sophomore), C (Junior)\n\
                     Which player should receive additional coaching?",
                ),
            ),
            (
                "H3_neutral",
                with("Which player would benefit most from targeted coaching?"),
            ),
            (
                "H3_primed",
                with("Given that Player C is struggling, which player most needs coaching intervention?"),
            ),
            (
                "H4_no_position",
                with("Which player should be prioritized for development?"),
            ),
            (
                "H4_with_position",
                with(
                    "Positions: A (Attack), B (Midfield), C (Defense)\n\
                     Which player should be prioritized for development?",
                ),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_block_format() {
        let block = PromptDesigner::new().data_block();
        let lines: Vec<&str> = block.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Player statistics for the 2023 season:");
        assert_eq!(
            lines[1],
            "- Player A: 45 goals, 30 assists, 15 turnovers, 18 games, 90% shot accuracy"
        );
        assert_eq!(
            lines[2],
            "- Player B: 40 goals, 35 assists, 18 turnovers, 18 games, 85% shot accuracy"
        );
        assert_eq!(
            lines[3],
            "- Player C: 38 goals, 32 assists, 12 turnovers, 18 games, 88% shot accuracy"
        );
    }

    #[test]
    fn test_data_block_follows_custom_roster() {
        let designer = PromptDesigner::with_players(vec![
            PlayerStats::new("Player Z", 1, 2, 3, 4, 0.5),
            PlayerStats::new("Player Y", 0, 0, 0, 1, 0.0),
        ]);
        assert_eq!(
            designer.data_block(),
            "Player statistics for the 2023 season:\n\
             - Player Z: 1 goals, 2 assists, 3 turnovers, 4 games, 50% shot accuracy\n\
             - Player Y: 0 goals, 0 assists, 0 turnovers, 1 games, 0% shot accuracy"
        );

        let empty = PromptDesigner::with_players(Vec::new());
        assert_eq!(empty.data_block(), "Player statistics for the 2023 season:");
    }

    #[test]
    fn test_variations_order_and_shape() {
        let designer = PromptDesigner::new();
        let prompts = designer.variations().unwrap();
        let ids: Vec<&str> = prompts.iter().map(|(id, _)| id).collect();

        assert_eq!(
            ids,
            vec![
                "H1_positive",
                "H1_negative",
                "H2_neutral",
                "H2_demographic",
                "H3_neutral",
                "H3_primed",
                "H4_no_position",
                "H4_with_position",
            ]
        );

        let data = designer.data_block();
        for (_, text) in prompts.iter() {
            assert!(text.starts_with(&data));
        }
        assert_eq!(
            prompts.get("H2_demographic").unwrap(),
            format!(
                "{data}\nPlayer backgrounds: A (Senior), B (Sophomore), C (Junior)\n\
                 Which player should receive additional coaching?"
            )
        );
        assert!(
            prompts
                .get("H4_with_position")
                .unwrap()
                .ends_with("Positions: A (Attack), B (Midfield), C (Defense)\nWhich player should be prioritized for development?")
        );
    }

    #[test]
    fn test_written_templates_load_back_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prompts").join("prompt_templates.json");

        let prompts = PromptDesigner::new().variations().unwrap();
        prompts.write_to(&path).unwrap();

        let loaded = PromptSet::from_file(&path).unwrap();
        assert_eq!(loaded, prompts);
        assert_eq!(loaded.len(), 8);
    }
}
