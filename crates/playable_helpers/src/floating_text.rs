use core::time::Duration;

use bevy::prelude::*;

use crate::FONT;

/// Short-lived world-space text that rises and shrinks away, used for
/// "+1" style feedback next to HUD counters.
#[derive(Component)]
pub struct FloatingText {
    timer: Timer,
    origin: Vec2,
}

pub fn spawn_floating_text(
    commands: &mut Commands,
    position: Vec2,
    text: &str,
    color: Srgba,
    asset_server: &Res<AssetServer>,
) {
    commands.spawn((
        Text2d::new(text),
        TextFont {
            font: asset_server.load(FONT),
            font_size: 20.0,
            ..default()
        },
        TextColor(Color::Srgba(color)),
        Transform::from_translation(position.extend(50.0)),
        FloatingText {
            timer: Timer::new(Duration::from_millis(800), TimerMode::Once),
            origin: position,
        },
    ));
}

pub fn animate_floating_text(
    mut commands: Commands,
    time: Res<Time>,
    mut query: Query<(Entity, &mut Transform, &mut FloatingText)>,
) {
    for (entity, mut transform, mut floating) in &mut query {
        floating.timer.tick(time.delta());
        let progress = floating.timer.fraction();

        // Drift upwards and shrink out
        transform.translation.y = 40.0f32.mul_add(progress, floating.origin.y);
        transform.scale = Vec3::splat(1.0 - progress);

        if floating.timer.finished() {
            commands.entity(entity).despawn();
        }
    }
}
