/// Fixed output geometries accepted by the remote reference-image protocol.
///
/// The service rejects reference and vibe uploads at any other pixel
/// dimensions, so every incoming image is letterboxed onto the closest of
/// these canvases before it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasGeometry {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

impl CanvasGeometry {
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Declaration order doubles as the tie-break order for best-fit selection.
pub const CANVASES: [CanvasGeometry; 3] = [
    CanvasGeometry {
        name: "portrait",
        width: 1024,
        height: 1536,
    },
    CanvasGeometry {
        name: "square",
        width: 1472,
        height: 1472,
    },
    CanvasGeometry {
        name: "landscape",
        width: 1536,
        height: 1024,
    },
];

/// Picks the canvas whose aspect ratio is closest to the source image's.
/// Strict `<` keeps the first declared canvas on exact ties.
pub fn best_fit(width: u32, height: u32) -> CanvasGeometry {
    let aspect = width as f64 / height.max(1) as f64;
    let mut best = CANVASES[0];
    let mut best_delta = f64::MAX;
    for canvas in CANVASES {
        let delta = (canvas.aspect() - aspect).abs();
        if delta < best_delta {
            best = canvas;
            best_delta = delta;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::{best_fit, CANVASES};

    #[test]
    fn canvas_table_is_portrait_square_landscape() {
        assert_eq!(CANVASES[0].name, "portrait");
        assert_eq!((CANVASES[0].width, CANVASES[0].height), (1024, 1536));
        assert_eq!((CANVASES[1].width, CANVASES[1].height), (1472, 1472));
        assert_eq!((CANVASES[2].width, CANVASES[2].height), (1536, 1024));
    }

    #[test]
    fn extreme_ratios_pick_the_outer_canvases() {
        assert_eq!(best_fit(500, 2000).name, "portrait");
        assert_eq!(best_fit(2000, 500).name, "landscape");
        assert_eq!(best_fit(800, 800).name, "square");
    }

    #[test]
    fn boundary_ratios_flip_at_the_midpoints() {
        // Portrait aspect is 2/3, square is 1: the midpoint sits at 5/6.
        assert_eq!(best_fit(832, 1000).name, "portrait");
        assert_eq!(best_fit(84, 100).name, "square");
        // Square to landscape midpoint sits at 5/4.
        assert_eq!(best_fit(124, 100).name, "square");
        assert_eq!(best_fit(126, 100).name, "landscape");
    }

    #[test]
    fn selection_is_deterministic() {
        for _ in 0..8 {
            assert_eq!(best_fit(1029, 1029).name, best_fit(1029, 1029).name);
        }
    }

    #[test]
    fn exact_canvas_dimensions_select_themselves() {
        for canvas in CANVASES {
            assert_eq!(best_fit(canvas.width, canvas.height).name, canvas.name);
        }
    }
}
