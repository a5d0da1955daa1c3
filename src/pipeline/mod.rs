//! Pipeline stages for bundle synchronisation.
//!
//! Each submodule implements one step; [`crate::sync`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! link ──▶ fetch ──▶ extract ──▶ layers ──▶ compose ──▶ rasterize
//!                                  │
//!                                  └──▶ text ──▶ assemble
//!
//! (working folder) ──▶ compress ──▶ package
//! ```
//!
//! 1. [`link`]      — rewrite a catalog link into the bundle URL and derive
//!    the folder name; pure
//! 2. [`fetch`]     — stream the bundle to disk; the only stage with network I/O
//! 3. [`extract`]   — unzip, undo the `.dg*` renames, stage `current.svg` and
//!    `preview.png`
//! 4. [`layers`]    — parse `<image>` layers and the canvas size
//! 5. [`compose`] / [`encode`] — inline background + clipart assets into one SVG
//! 6. [`rasterize`] — hand that SVG to an external converter
//! 7. [`text`]      — classify and rewrite text fields
//! 8. [`assemble`]  — build the final layered document
//! 9. [`compress`]  — shrink raster assets towards the byte budget
//! 10. [`package`]  — zip and publish
//!
//! [`walk`] holds the sorted directory walks shared by several stages;
//! [`publish`] moves finished directories into place one writer at a time.

pub mod assemble;
pub mod compose;
pub mod compress;
pub mod encode;
pub mod extract;
pub mod fetch;
pub mod layers;
pub mod link;
pub mod package;
pub mod publish;
pub mod rasterize;
pub mod text;
pub mod walk;
