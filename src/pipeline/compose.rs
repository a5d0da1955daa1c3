//! Background compositor: serialise accepted layers into a standalone SVG.
//!
//! The output holds nothing but the background and clipart images, each with
//! its asset inlined, its original geometry, and a rotation about its own
//! centre. It carries no size of its own; the rasteriser is told the canvas
//! size explicitly.

use crate::pipeline::layers::EmbeddedLayer;
use std::fmt::Write as _;

/// Serialise the composited layers, in document order.
pub fn compose_background(layers: &[EmbeddedLayer]) -> String {
    let mut body = String::new();
    for embedded in layers {
        let l = &embedded.layer;
        let (cx, cy) = l.center();
        let _ = writeln!(
            body,
            r#"<image href="{}" x="{}" y="{}" width="{}" height="{}" transform="rotate({}, {}, {})" />"#,
            embedded.data_uri, l.x, l.y, l.width, l.height, l.angle, cx, cy
        );
    }
    format!(r#"<svg xmlns="http://www.w3.org/2000/svg">{body}</svg>"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layers::{Layer, LayerKind};

    fn embedded(x: f64, y: f64, w: f64, h: f64, angle: f64) -> EmbeddedLayer {
        EmbeddedLayer {
            layer: Layer {
                kind: LayerKind::Clipart,
                x,
                y,
                width: w,
                height: h,
                angle,
                href: "a.png".into(),
            },
            data_uri: "data:image/jpeg;base64,AAAA".into(),
        }
    }

    #[test]
    fn rotation_is_about_each_center() {
        let svg = compose_background(&[embedded(10.0, 20.0, 100.0, 50.0, 30.0)]);
        assert!(svg.contains(r#"transform="rotate(30, 60, 45)""#), "{svg}");
        assert!(svg.contains(r#"x="10" y="20" width="100" height="50""#));
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg">"#));
    }

    #[test]
    fn output_parses_and_keeps_order() {
        let svg = compose_background(&[
            embedded(0.0, 0.0, 600.0, 400.0, 0.0),
            embedded(1.5, 2.5, 3.0, 4.0, -12.5),
        ]);
        let doc = roxmltree::Document::parse(&svg).expect("well-formed");
        let xs: Vec<&str> = doc
            .descendants()
            .filter(|n| n.has_tag_name("image"))
            .filter_map(|n| n.attribute("x"))
            .collect();
        assert_eq!(xs, ["0", "1.5"]);
    }

    #[test]
    fn empty_layer_list_is_an_empty_document() {
        assert_eq!(
            compose_background(&[]),
            r#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#
        );
    }
}
