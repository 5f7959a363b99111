use bevy::prelude::*;
use bevy_asset_loader::prelude::*;
use bevy_kira_audio::prelude::*;

use crate::core::{MergeCommitted, SoundToggled, StructureRevealed};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Default, States)]
enum AudioAssetState {
    #[default]
    Loading,
    Loaded,
}

#[derive(AssetCollection, Resource)]
struct AudioAssets {
    #[asset(path = "audio/music.ogg")]
    music: Handle<bevy_kira_audio::prelude::AudioSource>,
    #[asset(path = "audio/build.ogg")]
    build: Handle<bevy_kira_audio::prelude::AudioSource>,
    #[asset(path = "audio/swoosh.ogg")]
    swoosh: Handle<bevy_kira_audio::prelude::AudioSource>,
}

#[derive(Resource, Default)]
struct Muted(bool);

pub struct GameAudioPlugin;

impl Plugin for GameAudioPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(AudioPlugin)
            .add_event::<SoundToggled>()
            .init_resource::<Muted>()
            .init_state::<AudioAssetState>()
            .add_loading_state(
                LoadingState::new(AudioAssetState::Loading)
                    .continue_to_state(AudioAssetState::Loaded)
                    .load_collection::<AudioAssets>(),
            )
            .add_systems(OnEnter(AudioAssetState::Loaded), start_music)
            .add_systems(
                Update,
                (merge_audio, build_audio).run_if(in_state(AudioAssetState::Loaded)),
            )
            .add_systems(Update, apply_sound_toggle);
    }
}

fn start_music(audio_assets: Res<AudioAssets>, audio: Res<Audio>) {
    audio
        .play(audio_assets.music.clone_weak())
        .looped()
        .with_volume(0.1);
}

fn merge_audio(
    audio_assets: Res<AudioAssets>,
    audio: Res<Audio>,
    mut merges: EventReader<MergeCommitted>,
) {
    for _ in merges.read() {
        audio.play(audio_assets.swoosh.clone_weak()).with_volume(0.2);
    }
}

fn build_audio(
    audio_assets: Res<AudioAssets>,
    audio: Res<Audio>,
    mut reveals: EventReader<StructureRevealed>,
) {
    for _ in reveals.read() {
        audio.play(audio_assets.build.clone_weak()).with_volume(0.2);
    }
}

fn apply_sound_toggle(
    mut toggles: EventReader<SoundToggled>,
    mut muted: ResMut<Muted>,
    audio: Res<Audio>,
) {
    for _ in toggles.read() {
        muted.0 = !muted.0;
        if muted.0 {
            audio.set_volume(0.0);
        } else {
            audio.set_volume(1.0);
        }
        info!(muted = muted.0, "sound toggled");
    }
}
