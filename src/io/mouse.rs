//! Mouse position and button state.

use serde::Deserialize;

use crate::runtime::stage::{STAGE_HEIGHT, STAGE_WIDTH};

/// Raw mouse event in canvas coordinates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseEvent {
    pub x: f64,
    pub y: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
    #[serde(default)]
    pub is_down: Option<bool>,
}

#[derive(Debug, Default)]
pub struct Mouse {
    client_x: f64,
    client_y: f64,
    scratch_x: f64,
    scratch_y: f64,
    is_down: bool,
}

impl Mouse {
    /// Record a position (and optionally a button change).
    pub fn post_data(
        &mut self,
        event: MouseEvent,
    ) {
        if event.canvas_width > 0.0 && event.canvas_height > 0.0 {
            self.client_x = event.x;
            self.client_y = event.y;
            let half_w = STAGE_WIDTH / 2.0;
            let half_h = STAGE_HEIGHT / 2.0;
            self.scratch_x = (STAGE_WIDTH * (event.x / event.canvas_width - 0.5))
                .round()
                .clamp(-half_w, half_w);
            self.scratch_y = (-STAGE_HEIGHT * (event.y / event.canvas_height - 0.5))
                .round()
                .clamp(-half_h, half_h);
        }
        if let Some(is_down) = event.is_down {
            self.is_down = is_down;
        }
    }

    #[inline]
    pub fn client_x(&self) -> f64 {
        self.client_x
    }

    #[inline]
    pub fn client_y(&self) -> f64 {
        self.client_y
    }

    /// X in stage units.
    #[inline]
    pub fn scratch_x(&self) -> f64 {
        self.scratch_x
    }

    /// Y in stage units, up is positive.
    #[inline]
    pub fn scratch_y(&self) -> f64 {
        self.scratch_y
    }

    #[inline]
    pub fn is_down(&self) -> bool {
        self.is_down
    }
}
