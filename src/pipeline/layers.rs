//! Design-markup parsing and layer classification.
//!
//! Design markup is SVG with extra `Dg*` attributes. Every `<image>` element
//! is a layer; its `Dg_type` attribute says what the layer is:
//!
//! | `Dg_type`      | Kind                  | Used by                        |
//! |----------------|-----------------------|--------------------------------|
//! | `DgBackGround` | [`LayerKind::Background`] | compositor, defines the canvas |
//! | `DgClipart`    | [`LayerKind::Clipart`]    | compositor, logo detection     |
//! | `DgPhoto`      | [`LayerKind::Photo`]      | final assembler (profile)      |
//! | anything else  | [`LayerKind::Other`]      | nobody                         |

use crate::error::SyncError;
use crate::pipeline::encode::embed_file;
use crate::pipeline::extract::normalized_file_name;
use crate::pipeline::walk::find_named;
use roxmltree::{Document, Node, ParsingOptions};
use std::path::Path;
use tracing::{debug, warn};

/// Folder marker that precedes a logo's sub-folder in a clipart href.
const CLIPART_MARKER: &str = "Clipart/";

/// Classification of an `<image>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerKind {
    Background,
    Clipart,
    Photo,
    /// Missing or unrecognised `Dg_type`.
    Other(Option<String>),
}

impl LayerKind {
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("DgBackGround") => LayerKind::Background,
            Some("DgClipart") => LayerKind::Clipart,
            Some("DgPhoto") => LayerKind::Photo,
            other => LayerKind::Other(other.map(str::to_string)),
        }
    }

    /// Layers baked into the background raster.
    pub fn is_composited(&self) -> bool {
        matches!(self, LayerKind::Background | LayerKind::Clipart)
    }
}

/// One `<image>` element of the design.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub kind: LayerKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in degrees (`DgAngleZ`).
    pub angle: f64,
    /// `xlink:href` or `href`; empty when absent.
    pub href: String,
}

impl Layer {
    /// Rotation pivot: the element's own centre.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// A clipart layer is a logo when its href continues into a sub-folder
    /// after the clipart folder (`…/Clipart/Logos/acme.png`).
    pub fn is_logo(&self) -> bool {
        self.kind == LayerKind::Clipart
            && self
                .href
                .find(CLIPART_MARKER)
                .is_some_and(|idx| self.href[idx + CLIPART_MARKER.len()..].contains('/'))
    }

    /// Base name of the referenced asset.
    pub fn asset_name(&self) -> Option<&str> {
        self.href
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
    }
}

/// Output size of the background raster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// A zero dimension means no usable background was found.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A composited layer with its asset inlined.
#[derive(Debug, Clone)]
pub struct EmbeddedLayer {
    pub layer: Layer,
    pub data_uri: String,
}

/// Parse design markup into a `roxmltree` document, tolerating a DOCTYPE.
pub fn parse_markup<'a>(markup: &'a str, path: &Path) -> Result<Document<'a>, SyncError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(markup, options).map_err(|e| SyncError::InvalidMarkup {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Value of the attribute whose local name is `name`, whatever its prefix.
pub(crate) fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| a.value())
}

/// Numeric attribute, `0` when missing or unparsable.
pub(crate) fn num_attr(node: Node<'_, '_>, name: &str) -> f64 {
    attr(node, name)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Build a [`Layer`] from an `<image>` element.
pub(crate) fn layer_from_node(node: Node<'_, '_>) -> Layer {
    Layer {
        kind: LayerKind::from_attr(attr(node, "Dg_type")),
        x: num_attr(node, "x"),
        y: num_attr(node, "y"),
        width: num_attr(node, "width"),
        height: num_attr(node, "height"),
        angle: num_attr(node, "DgAngleZ"),
        href: attr(node, "href").unwrap_or_default().to_string(),
    }
}

/// Every `<image>` element of the markup, in document order.
pub fn parse_layers(markup: &str, path: &Path) -> Result<Vec<Layer>, SyncError> {
    let doc = parse_markup(markup, path)?;
    let layers: Vec<Layer> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "image")
        .map(layer_from_node)
        .collect();
    debug!("Parsed {} image layers from {}", layers.len(), path.display());
    Ok(layers)
}

/// Canvas size from the background layer (the last one wins, as the editor
/// stacks later backgrounds over earlier ones). Dimensions are truncated.
pub fn canvas_size(layers: &[Layer]) -> Canvas {
    layers
        .iter()
        .rev()
        .find(|l| l.kind == LayerKind::Background)
        .map(|bg| Canvas {
            width: bg.width.max(0.0) as u32,
            height: bg.height.max(0.0) as u32,
        })
        .unwrap_or_default()
}

/// Background and clipart layers with a reference, in document order.
pub fn composite_layers(layers: &[Layer]) -> Vec<&Layer> {
    layers
        .iter()
        .filter(|l| l.kind.is_composited() && !l.href.is_empty())
        .collect()
}

/// Resolve every composited layer's asset under `asset_root` and inline it.
///
/// An href may still carry the bundle's `.dg*` name; the renamed file is
/// looked up when the literal name is absent. Layers whose asset cannot be
/// found or read are skipped with a warning.
pub fn embed_layers(layers: &[&Layer], asset_root: &Path) -> Vec<EmbeddedLayer> {
    layers
        .iter()
        .filter_map(|layer| {
            let Some(name) = layer.asset_name() else {
                warn!("Layer has no usable asset name: '{}'", layer.href);
                return None;
            };
            let found = find_named(asset_root, name)
                .or_else(|| normalized_file_name(name).and_then(|n| find_named(asset_root, &n)));
            let Some(path) = found else {
                warn!("Asset '{}' not found in bundle; layer skipped", name);
                return None;
            };
            match embed_file(&path) {
                Ok(data_uri) => Some(EmbeddedLayer {
                    layer: (*layer).clone(),
                    data_uri,
                }),
                Err(e) => {
                    warn!("Could not read asset {}: {}; layer skipped", path.display(), e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DESIGN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="600" height="400">
  <image Dg_type="DgBackGround" x="0" y="0" width="600.7" height="400" xlink:href="C:/Design/Images/bg.png"/>
  <image Dg_type="DgClipart" x="10" y="20" width="100" height="50" DgAngleZ="45" xlink:href="Design/Clipart/Logos/acme.png"/>
  <image Dg_type="DgClipart" x="0" y="0" width="10" height="10" href="Design/Clipart/star.png"/>
  <image Dg_type="DgPhoto" x="400" y="100" width="120" height="120" xlink:href="Design/photo.jpg"/>
  <image x="1" y="1" width="1" height="1" xlink:href="untyped.png"/>
</svg>"#;

    fn layers() -> Vec<Layer> {
        parse_layers(DESIGN, Path::new("design.svg")).unwrap()
    }

    #[test]
    fn classifies_every_image() {
        let kinds: Vec<LayerKind> = layers().into_iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LayerKind::Background,
                LayerKind::Clipart,
                LayerKind::Clipart,
                LayerKind::Photo,
                LayerKind::Other(None),
            ]
        );
    }

    #[test]
    fn canvas_comes_from_background_truncated() {
        assert_eq!(
            canvas_size(&layers()),
            Canvas {
                width: 600,
                height: 400
            }
        );
    }

    #[test]
    fn last_background_sets_the_canvas() {
        let markup = r#"<svg>
  <image Dg_type="DgBackGround" width="300" height="200" href="Images/old.png"/>
  <image Dg_type="DgClipart" width="900" height="900" href="Design/Clipart/big.png"/>
  <image Dg_type="DgBackGround" width="1050" height="600" href="Images/new.png"/>
</svg>"#;
        let layers = parse_layers(markup, Path::new("design.svg")).unwrap();
        assert_eq!(
            canvas_size(&layers),
            Canvas {
                width: 1050,
                height: 600
            }
        );
    }

    #[test]
    fn missing_background_gives_empty_canvas() {
        let only_clipart: Vec<Layer> = layers()
            .into_iter()
            .filter(|l| l.kind != LayerKind::Background)
            .collect();
        assert!(canvas_size(&only_clipart).is_empty());
    }

    #[test]
    fn only_background_and_clipart_are_composited() {
        let all = layers();
        let accepted = composite_layers(&all);
        assert_eq!(accepted.len(), 3);
        assert!(accepted.iter().all(|l| l.kind.is_composited()));
    }

    #[test]
    fn logo_needs_nested_clipart_folder() {
        let all = layers();
        assert!(all[1].is_logo());
        assert!(!all[2].is_logo());
        assert!(!all[3].is_logo());
    }

    #[test]
    fn rotation_pivots_on_center() {
        let all = layers();
        assert_eq!(all[1].center(), (60.0, 45.0));
        assert_eq!(all[1].angle, 45.0);
    }

    #[test]
    fn asset_name_handles_both_separators() {
        let all = layers();
        assert_eq!(all[0].asset_name(), Some("bg.png"));
        assert_eq!(all[2].asset_name(), Some("star.png"));
    }

    #[test]
    fn invalid_markup_is_reported() {
        let err = parse_layers("<svg><image></svg>", Path::new("x.svg")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidMarkup { .. }));
    }

    #[test]
    fn embeds_found_assets_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Design/Images")).unwrap();
        fs::write(dir.path().join("Design/Images/bg.png"), b"bg").unwrap();

        let all = layers();
        let accepted = composite_layers(&all);
        let embedded = embed_layers(&accepted, dir.path());
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].layer.kind, LayerKind::Background);
        assert!(embedded[0].data_uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn bundle_names_resolve_to_renamed_assets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("star.png"), b"star").unwrap();
        let layer = Layer {
            kind: LayerKind::Clipart,
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            angle: 0.0,
            href: "Design/Clipart/star.dgpng".into(),
        };
        let embedded = embed_layers(&[&layer], dir.path());
        assert_eq!(embedded.len(), 1);
    }
}
