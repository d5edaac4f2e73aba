//! Render mode flags and the commands that flip them.
//!
//! [`RenderSettings`] is a small `Copy` value; every toggle produces a new
//! one and the session swaps it in whole. All flag combinations are legal.

use crate::shading::ShadingMode;

/// Mask colour presets: skin, red, green, blue, gold, purple
pub const MASK_COLORS: [[u8; 3]; 6] = [
    [204, 178, 153],
    [230, 26, 26],
    [26, 204, 51],
    [51, 51, 230],
    [230, 178, 26],
    [178, 77, 230],
];

/// Discrete user commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleBackground,
    CycleColor,
    /// Select a preset by index into [`MASK_COLORS`]
    SelectColor(usize),
    ToggleTexture,
    ToggleLandmarks,
    ToggleFollow,
    CycleShading,
    SelectShading(ShadingMode),
    Export,
    ToggleRecording,
    Quit,
}

/// Snapshot of every render toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub shading: ShadingMode,
    pub follow: bool,
    pub background: bool,
    pub textured: bool,
    pub landmarks: bool,
    pub color_index: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shading: ShadingMode::default(),
            follow: true,
            background: true,
            textured: true,
            landmarks: false,
            color_index: 0,
        }
    }
}

impl RenderSettings {
    /// Settings after `command`; commands without a flag leave them unchanged
    pub fn apply(self, command: Command) -> Self {
        match command {
            Command::ToggleBackground => Self {
                background: !self.background,
                ..self
            },
            Command::CycleColor => Self {
                color_index: (self.color_index + 1) % MASK_COLORS.len(),
                ..self
            },
            Command::SelectColor(index) if index < MASK_COLORS.len() => Self {
                color_index: index,
                ..self
            },
            Command::SelectColor(_) => self,
            Command::ToggleTexture => Self {
                textured: !self.textured,
                ..self
            },
            Command::ToggleLandmarks => Self {
                landmarks: !self.landmarks,
                ..self
            },
            Command::ToggleFollow => Self {
                follow: !self.follow,
                ..self
            },
            Command::CycleShading => Self {
                shading: self.shading.next(),
                ..self
            },
            Command::SelectShading(shading) => Self { shading, ..self },
            Command::Export | Command::ToggleRecording | Command::Quit => self,
        }
    }

    pub fn mask_color(&self) -> [u8; 3] {
        MASK_COLORS[self.color_index % MASK_COLORS.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_are_involutions() {
        let start = RenderSettings::default();
        for command in [
            Command::ToggleBackground,
            Command::ToggleTexture,
            Command::ToggleLandmarks,
            Command::ToggleFollow,
        ] {
            let flipped = start.apply(command);
            assert_ne!(flipped, start);
            assert_eq!(flipped.apply(command), start);
        }
    }

    #[test]
    fn test_color_cycle_wraps() {
        let mut settings = RenderSettings::default();
        for _ in 0..MASK_COLORS.len() {
            settings = settings.apply(Command::CycleColor);
        }
        assert_eq!(settings.color_index, 0);
    }

    #[test]
    fn test_select_color_out_of_range_ignored() {
        let settings = RenderSettings::default().apply(Command::SelectColor(3));
        assert_eq!(settings.mask_color(), MASK_COLORS[3]);
        assert_eq!(settings.apply(Command::SelectColor(6)), settings);
    }

    #[test]
    fn test_non_flag_commands_leave_settings() {
        let settings = RenderSettings::default();
        assert_eq!(settings.apply(Command::Export), settings);
        assert_eq!(settings.apply(Command::Quit), settings);
    }

    #[test]
    fn test_shading_selection() {
        let settings = RenderSettings::default().apply(Command::SelectShading(ShadingMode::MatCap));
        assert_eq!(settings.shading, ShadingMode::MatCap);
        assert_eq!(settings.apply(Command::CycleShading).shading, ShadingMode::Wireframe);
    }
}
