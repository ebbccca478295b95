//! Image transition state for the backdrop compositor.
//!
//! ```text
//! SceneCommand --> CommandBridge --> TransitionEngine --> CompositeState
//!                                          |
//!                                     ImageCache <-- ImageSource (files / http)
//!                                          |
//!                                    DecodedImage uploads --> renderer
//! ```
//!
//! The engine never touches the GPU. It hands out [`TextureKey`]s and decoded
//! pixels; the renderer owns the textures those keys name.

pub mod assets;
pub mod cache;
pub mod commands;
pub mod engine;
pub mod timeline;

pub use assets::{AssetError, AssetSource, FileSource, HttpSource, ImageSource};
pub use cache::{CacheStatus, DecodedImage, ImageCache, LoadedImage, TextureKey};
pub use commands::{command_channel, CommandBridge, CommandSender, SceneCommand};
pub use engine::{
    BlendMode, CompositeState, FadeState, Phase, PreloadSet, SlideChange, TransitionEngine,
};
