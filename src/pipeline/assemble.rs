//! Final-document assembly.
//!
//! The published `current.svg` is a small layered document that editors can
//! fill in without knowing the bundle format:
//!
//! ```text
//! background.png   rasterised composite of background + clipart
//! logo.png         at the geometry of the logo clipart (zeros if none)
//! <mask>           circle inscribed in the profile photo's box
//! profile.png      masked by the circle
//! <text>…          every text element of the re-laid-out markup, verbatim
//! ```

use crate::error::SyncError;
use crate::pipeline::layers::{attr, layer_from_node, parse_markup, Layer, LayerKind};
use crate::pipeline::text::is_top_level_text;
use std::path::Path;
use tracing::debug;

/// Image names referenced by the final document.
pub const BACKGROUND_IMAGE: &str = "background.png";
pub const LOGO_IMAGE: &str = "logo.png";
pub const PROFILE_IMAGE: &str = "profile.png";

const MASK_ID: &str = "myMask";

/// Geometry of the optional overlay images.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<&Layer> for Rect {
    fn from(l: &Layer) -> Self {
        Rect {
            x: l.x,
            y: l.y,
            width: l.width,
            height: l.height,
        }
    }
}

/// Build the final layered document from the re-laid-out markup.
pub fn assemble_final(markup: &str, path: &Path) -> Result<String, SyncError> {
    let doc = parse_markup(markup, path)?;
    let root = doc.root_element();
    let width = attr(root, "width").unwrap_or("0");
    let height = attr(root, "height").unwrap_or("0");

    let layers: Vec<Layer> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "image")
        .map(layer_from_node)
        .collect();

    // Later layers override earlier ones.
    let profile = layers.iter().rfind(|l| l.kind == LayerKind::Photo);
    let logo = layers.iter().rfind(|l| l.is_logo());
    debug!(
        "Final document: profile={}, logo={}",
        profile.is_some(),
        logo.is_some()
    );

    let logo = logo.map(Rect::from).unwrap_or_default();
    let profile = profile.map(Rect::from).unwrap_or_default();
    let r = profile.width / 2.0;
    let cx = profile.x + r;
    let cy = profile.y + profile.height / 2.0;

    let mut texts = String::new();
    for node in doc.descendants().filter(|n| is_top_level_text(*n)) {
        texts.push_str(&markup[node.range()]);
        texts.push('\n');
    }

    Ok(format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}">
  <image href="{BACKGROUND_IMAGE}" x="0" y="0" />
  <image x="{lx}" y="{ly}" width="{lw}" height="{lh}" href="{LOGO_IMAGE}" />
  <defs>
    <mask id="{MASK_ID}">
      <circle cx="{cx}" cy="{cy}" r="{r}" fill="white" />
    </mask>
  </defs>
  <image href="{PROFILE_IMAGE}" x="{px}" y="{py}" width="{pw}" height="{ph}" mask="url(#{MASK_ID})" />
{texts}</svg>
"#,
        width = crate::pipeline::text::escape_xml(width),
        height = crate::pipeline::text::escape_xml(height),
        lx = logo.x,
        ly = logo.y,
        lw = logo.width,
        lh = logo.height,
        px = profile.x,
        py = profile.y,
        pw = profile.width,
        ph = profile.height,
    ))
}
