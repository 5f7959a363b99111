use bevy::prelude::*;

/// Frame-stepped playback over a sprite's texture atlas. The goblin work
/// cycle loops; the mine smoke plays once and reports back.
#[derive(Component)]
pub struct AtlasAnimation {
    pub timer: Timer,
    pub frames: usize,
    pub playing: bool,
    pub looping: bool,
}

impl AtlasAnimation {
    pub fn repeating(frames: usize, fps: f32) -> Self {
        Self {
            timer: Timer::from_seconds(1.0 / fps, TimerMode::Repeating),
            frames,
            playing: true,
            looping: true,
        }
    }

    pub fn one_shot(frames: usize, fps: f32) -> Self {
        Self {
            timer: Timer::from_seconds(1.0 / fps, TimerMode::Repeating),
            frames,
            playing: false,
            looping: false,
        }
    }
}

/// Restart playback from the given frame.
pub fn goto_and_play(animation: &mut AtlasAnimation, sprite: &mut Sprite, frame: usize) {
    if let Some(atlas) = &mut sprite.texture_atlas {
        atlas.index = frame.min(animation.frames.saturating_sub(1));
    }
    animation.playing = true;
    animation.timer.reset();
}

/// A one-shot animation played its last frame.
#[derive(Event)]
pub struct AtlasAnimationFinished {
    pub entity: Entity,
}

pub struct AnimationPlugin;

impl Plugin for AnimationPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<AtlasAnimationFinished>()
            .add_systems(Update, advance_atlas_animations);
    }
}

fn advance_atlas_animations(
    time: Res<Time>,
    mut query: Query<(Entity, &mut AtlasAnimation, &mut Sprite)>,
    mut finished: EventWriter<AtlasAnimationFinished>,
) {
    for (entity, mut animation, mut sprite) in &mut query {
        if !animation.playing {
            continue;
        }
        animation.timer.tick(time.delta());
        if !animation.timer.just_finished() {
            continue;
        }

        let Some(atlas) = &mut sprite.texture_atlas else {
            continue;
        };

        let next = atlas.index + 1;
        if next >= animation.frames {
            if animation.looping {
                atlas.index = 0;
            } else {
                animation.playing = false;
                finished.send(AtlasAnimationFinished { entity });
            }
        } else {
            atlas.index = next;
        }
    }
}
