//! Target validity filter
//!
//! A matched element is only handed back when a user could plausibly act on
//! it: it has area, is rendered, is not transparent, and sits in or near the
//! viewport.

use waypoint_core_types::{Display, ElementLayout, NodeId, Viewport, Visibility};
use waypoint_dom::Document;

/// Whether `node` exists and is actionable in `document`.
pub fn is_valid_target(document: &dyn Document, node: NodeId) -> bool {
    match document.layout(node) {
        Some(layout) => is_actionable(&layout, &document.viewport()),
        None => false,
    }
}

/// Pure form of [`is_valid_target`] over an already computed layout.
pub fn is_actionable(layout: &ElementLayout, viewport: &Viewport) -> bool {
    let style = &layout.style;
    if !layout.rect.has_area() {
        return false;
    }
    if style.display == Display::None {
        return false;
    }
    if matches!(style.visibility, Visibility::Hidden | Visibility::Collapse) {
        return false;
    }
    // NaN opacity is treated as transparent.
    if !(style.opacity > 0.0) {
        return false;
    }
    is_near_viewport(layout, viewport)
}

/// Within one viewport above, two below, and two to either side.
fn is_near_viewport(layout: &ElementLayout, viewport: &Viewport) -> bool {
    let rect = &layout.rect;
    let (vw, vh) = (viewport.width, viewport.height);
    rect.top() < vh + 2.0 * vh
        && rect.bottom() > -vh
        && rect.left() < vw + 2.0 * vw
        && rect.right() > -2.0 * vw
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core_types::{ComputedStyle, Rect};

    fn layout(rect: Rect, style: ComputedStyle) -> ElementLayout {
        ElementLayout { rect, style }
    }

    fn visible(rect: Rect) -> ElementLayout {
        layout(rect, ComputedStyle::default())
    }

    const VIEWPORT: Viewport = Viewport {
        width: 1000.0,
        height: 500.0,
    };

    #[test]
    fn ordinary_boxes_are_valid() {
        assert!(is_actionable(
            &visible(Rect::new(10.0, 10.0, 80.0, 20.0)),
            &VIEWPORT
        ));
    }

    #[test]
    fn zero_area_is_invalid() {
        assert!(!is_actionable(
            &visible(Rect::new(10.0, 10.0, 0.0, 20.0)),
            &VIEWPORT
        ));
        assert!(!is_actionable(
            &visible(Rect::new(10.0, 10.0, 80.0, 0.0)),
            &VIEWPORT
        ));
    }

    #[test]
    fn hidden_styles_are_invalid() {
        let rect = Rect::new(10.0, 10.0, 80.0, 20.0);
        let none = ComputedStyle {
            display: Display::None,
            ..ComputedStyle::default()
        };
        let hidden = ComputedStyle {
            visibility: Visibility::Hidden,
            ..ComputedStyle::default()
        };
        let collapsed = ComputedStyle {
            visibility: Visibility::Collapse,
            ..ComputedStyle::default()
        };
        let transparent = ComputedStyle {
            opacity: 0.0,
            ..ComputedStyle::default()
        };
        for style in [none, hidden, collapsed, transparent] {
            assert!(!is_actionable(&layout(rect, style), &VIEWPORT), "{style:?}");
        }

        let faint = ComputedStyle {
            opacity: 0.05,
            ..ComputedStyle::default()
        };
        assert!(is_actionable(&layout(rect, faint), &VIEWPORT));
    }

    #[test]
    fn unreadable_opacity_is_invalid() {
        let rect = Rect::new(10.0, 10.0, 80.0, 20.0);
        for opacity in [f64::NAN, -0.5, -0.0] {
            let style = ComputedStyle {
                opacity,
                ..ComputedStyle::default()
            };
            assert!(!is_actionable(&layout(rect, style), &VIEWPORT), "{opacity}");
        }
    }

    #[test]
    fn viewport_nearness_bounds() {
        // Three viewport heights down is the limit.
        assert!(is_actionable(
            &visible(Rect::new(0.0, 1499.0, 10.0, 10.0)),
            &VIEWPORT
        ));
        assert!(!is_actionable(
            &visible(Rect::new(0.0, 1500.0, 10.0, 10.0)),
            &VIEWPORT
        ));
        // Bottom must stay below one viewport height above the top edge.
        assert!(!is_actionable(
            &visible(Rect::new(0.0, -520.0, 10.0, 20.0)),
            &VIEWPORT
        ));
        assert!(is_actionable(
            &visible(Rect::new(0.0, -519.0, 10.0, 20.0)),
            &VIEWPORT
        ));
        // Horizontal limits: right of 3 widths, left of -2 widths.
        assert!(!is_actionable(
            &visible(Rect::new(3000.0, 0.0, 10.0, 10.0)),
            &VIEWPORT
        ));
        assert!(!is_actionable(
            &visible(Rect::new(-2010.0, 0.0, 10.0, 10.0)),
            &VIEWPORT
        ));
        assert!(is_actionable(
            &visible(Rect::new(-2009.0, 0.0, 10.0, 10.0)),
            &VIEWPORT
        ));
    }
}
