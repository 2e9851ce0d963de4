//! Rating to engine strength mapping.

pub const MIN_ELO: u32 = 800;
pub const MAX_ELO: u32 = 3000;
/// Roughly one skill level per this many rating points.
pub const ELO_PER_SKILL_LEVEL: u32 = 110;
pub const MAX_SKILL_LEVEL: u8 = 20;

/// Skill level (0..=20) for a target rating, clamped to the supported range.
pub fn skill_level(rating: u32) -> u8 {
    let clamped = rating.clamp(MIN_ELO, MAX_ELO);
    let level = ((clamped - MIN_ELO) as f64 / ELO_PER_SKILL_LEVEL as f64).round() as u32;
    level.min(MAX_SKILL_LEVEL as u32) as u8
}

/// `setoption` pairs that make the engine play at `rating`.
pub(crate) fn strength_options(rating: u32) -> Vec<(&'static str, String)> {
    vec![
        ("Skill Level", skill_level(rating).to_string()),
        ("UCI_LimitStrength", "true".to_string()),
        ("UCI_Elo", rating.clamp(MIN_ELO, MAX_ELO).to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_level_bounds() {
        assert_eq!(skill_level(MIN_ELO), 0);
        assert_eq!(skill_level(MAX_ELO), MAX_SKILL_LEVEL);
        assert_eq!(skill_level(400), 0);
        assert_eq!(skill_level(5000), MAX_SKILL_LEVEL);
    }

    #[test]
    fn test_skill_level_steps() {
        assert_eq!(skill_level(1200), 4);
        assert_eq!(skill_level(1240), 4);
        assert_eq!(skill_level(910), 1);
        assert_eq!(skill_level(2000), 11);
    }

    #[test]
    fn test_skill_level_monotonic() {
        let mut last = 0;
        for rating in (0..4000).step_by(25) {
            let level = skill_level(rating);
            assert!(level >= last);
            last = level;
        }
    }

    #[test]
    fn test_strength_options_enable_limit() {
        let options = strength_options(650);
        assert_eq!(options[0], ("Skill Level", "0".to_string()));
        assert_eq!(options[1], ("UCI_LimitStrength", "true".to_string()));
        assert_eq!(options[2], ("UCI_Elo", "800".to_string()));
    }
}
