use bevy::prelude::*;

mod animation;
mod assets;
mod audio;
mod core;
mod drag;
mod finish;
mod hint;
mod merge;
mod progression;
mod rewards;
mod scene;
mod tween;

use crate::core::GamePhase;
use crate::scene::SceneConfig;

/// Entry point for the playable. The wasm shell (or a native wrapper)
/// calls this once per page load.
pub fn run() {
    let config = SceneConfig::default();
    if let Err(err) = config.validate() {
        error!("scene configuration rejected: {err}");
        return;
    }

    let mut app = playable_helpers::get_default_app(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );

    app.init_state::<GamePhase>()
        .insert_resource(config)
        .add_plugins(assets::GameAssetsPlugin)
        .add_plugins(tween::TweenPlugin)
        .add_plugins(animation::AnimationPlugin)
        .add_plugins(scene::ScenePlugin)
        .add_plugins(drag::DragPlugin)
        .add_plugins(merge::MergePlugin)
        .add_plugins(progression::ProgressionPlugin)
        .add_plugins(rewards::RewardPlugin)
        .add_plugins(hint::HintPlugin)
        .add_plugins(finish::FinishPlugin)
        .add_plugins(audio::GameAudioPlugin)
        .run();
}
