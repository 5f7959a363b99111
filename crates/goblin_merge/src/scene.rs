use bevy::prelude::*;
use playable_helpers::{FONT, WINDOW_HEIGHT, WINDOW_WIDTH};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::assets::{AssetState, GameAssets, GOBLIN_FRAMES, SMOKE_FRAMES};
use crate::core::{
    AdBadge, Chest, ChestIndex, ChestSprites, FinishBackdrop, FinishCta, FinishLogo,
    FinishOverlay, Goblin, GoblinSlot, GoblinTier, InstallButton, MergeText, Mine, MineBody,
    MineSmoke, ResourceIcon, ResourceKind, ResourceLabel, RewardEmitter, ShineRing, SlotIndex,
    SlotSprites,
};
use crate::animation::AtlasAnimation;
use crate::drag;
use crate::tween::{spawn_seq, Ease, TweenSeq, TweenStep};

pub const MINE_POS: Vec2 = Vec2::new(0.0, 40.0);
pub const MERGE_TEXT_POS: Vec2 = Vec2::new(0.0, 110.0);
pub const RESOURCE_BAR_Y: f32 = 290.0;
pub const RESOURCE_BAR_XS: [f32; 3] = [-115.0, 0.0, 115.0];
pub const INSTALL_BUTTON_POS: Vec2 = Vec2::new(-110.0, -285.0);
pub const FREE_BADGE_POS: Vec2 = Vec2::new(135.0, -295.0);

// Z layering, back to front.
pub const Z_BACKGROUND: f32 = 0.0;
pub const Z_MINE: f32 = 4.0;
pub const Z_CHEST: f32 = 5.0;
pub const Z_SLOT_BASE: f32 = 10.0;
pub const Z_SLOT_RAISED: f32 = 20.0;
pub const Z_MERGE_TEXT: f32 = 30.0;
pub const Z_FLIGHT: f32 = 60.0;
pub const Z_HUD: f32 = 80.0;
pub const Z_HINT: f32 = 90.0;
pub const Z_FINISH: f32 = 100.0;

const GOBLIN_FPS: f32 = 12.0;
const SMOKE_FPS: f32 = 10.0;

/// The scene is data-driven enough to misconfigure; these are startup
/// failures, raised before the app window even opens.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("need at least two goblin slots, got {0}")]
    NotEnoughSlots(usize),
    #[error("no two slots share a tier, so nothing can ever merge")]
    NoMergeablePair,
    #[error("a playable without chests has no reward loop")]
    NoChests,
    #[error("slot {index} at {x},{y} lies outside the {width}x{height} canvas")]
    SlotOutOfBounds {
        index: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

/// Authored placement of slots and chests. Chest order here is the reveal
/// order used by the mine.
#[derive(Resource, Clone)]
pub struct SceneConfig {
    pub slots: Vec<(Vec2, GoblinTier)>,
    pub chests: Vec<Vec2>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            slots: vec![
                (Vec2::new(110.0, -30.0), GoblinTier::TierA),
                (Vec2::new(90.0, -170.0), GoblinTier::TierA),
                (Vec2::new(-110.0, 140.0), GoblinTier::TierA),
            ],
            chests: vec![
                Vec2::new(0.0, 190.0),
                Vec2::new(-135.0, 105.0),
                Vec2::new(0.0, -260.0),
            ],
        }
    }
}

impl SceneConfig {
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.slots.len() < 2 {
            return Err(SceneError::NotEnoughSlots(self.slots.len()));
        }
        let mergeable = self
            .slots
            .iter()
            .any(|(_, tier)| self.slots.iter().filter(|(_, t)| t == tier).count() >= 2);
        if !mergeable {
            return Err(SceneError::NoMergeablePair);
        }
        if self.chests.is_empty() {
            return Err(SceneError::NoChests);
        }
        for (index, (position, _)) in self.slots.iter().enumerate() {
            if position.x.abs() > WINDOW_WIDTH / 2.0 || position.y.abs() > WINDOW_HEIGHT / 2.0 {
                return Err(SceneError::SlotOutOfBounds {
                    index,
                    x: position.x,
                    y: position.y,
                    width: WINDOW_WIDTH,
                    height: WINDOW_HEIGHT,
                });
            }
        }
        Ok(())
    }
}

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_camera).add_systems(
            OnEnter(AssetState::Ready),
            (spawn_scene, drag::register_draggables).chain(),
        );
    }
}

fn setup_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}

fn icon_image(assets: &GameAssets, kind: ResourceKind) -> Handle<Image> {
    match kind {
        ResourceKind::Coin => assets.coin.clone(),
        ResourceKind::Gem => assets.gem.clone(),
        ResourceKind::Potion => assets.potion.clone(),
    }
}

fn spawn_scene(
    mut commands: Commands,
    assets: Res<GameAssets>,
    mut layouts: ResMut<Assets<TextureAtlasLayout>>,
    config: Res<SceneConfig>,
    asset_server: Res<AssetServer>,
) {
    // Background, stretched to cover the canvas.
    commands.spawn((
        Sprite {
            image: assets.background.clone(),
            custom_size: Some(Vec2::new(WINDOW_WIDTH, WINDOW_HEIGHT)),
            ..default()
        },
        Transform::from_xyz(0.0, 0.0, Z_BACKGROUND),
    ));

    spawn_resource_bars(&mut commands, &assets, &asset_server);

    commands.spawn((
        Text2d::new("MERGE"),
        TextFont {
            font: asset_server.load(FONT),
            font_size: 56.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Transform::from_translation(MERGE_TEXT_POS.extend(Z_MERGE_TEXT)),
        MergeText,
    ));

    spawn_mine(&mut commands, &assets, &mut layouts);

    let goblin_layout = layouts.add(TextureAtlasLayout::from_grid(
        UVec2::new(64, 64),
        GOBLIN_FRAMES as u32,
        1,
        None,
        None,
    ));
    for (index, (position, tier)) in config.slots.iter().enumerate() {
        spawn_slot(
            &mut commands,
            &assets,
            &goblin_layout,
            *position,
            *tier,
            index,
        );
    }

    for (index, position) in config.chests.iter().enumerate() {
        spawn_chest(&mut commands, &assets, *position, index);
    }

    let install = commands
        .spawn((
            Sprite::from_image(assets.install_button.clone()),
            Transform::from_translation(INSTALL_BUTTON_POS.extend(Z_HUD)),
            InstallButton,
        ))
        .id();
    spawn_seq(
        &mut commands,
        TweenSeq::looping(
            install,
            vec![
                TweenStep::scale(Vec2::ONE, Vec2::splat(1.05), 0.6, Ease::SineInOut),
                TweenStep::scale(Vec2::splat(1.05), Vec2::ONE, 0.6, Ease::SineInOut),
            ],
        ),
    );

    commands.spawn((
        Sprite::from_image(assets.free_badge.clone()),
        Transform::from_translation(FREE_BADGE_POS.extend(Z_HUD)),
        AdBadge,
    ));

    spawn_finish_overlay(&mut commands, &assets);

    info!(
        slots = config.slots.len(),
        chests = config.chests.len(),
        "scene constructed"
    );
}

fn spawn_resource_bars(commands: &mut Commands, assets: &GameAssets, asset_server: &AssetServer) {
    for kind in ResourceKind::iter() {
        let x = RESOURCE_BAR_XS
            .get(kind.index())
            .copied()
            .unwrap_or_default();
        commands
            .spawn((
                Transform::from_xyz(x, RESOURCE_BAR_Y, Z_HUD),
                Visibility::default(),
            ))
            .with_children(|bar| {
                bar.spawn((
                    Sprite::from_color(Color::srgba(0.0, 0.0, 0.0, 0.6), Vec2::new(104.0, 34.0)),
                    Transform::from_xyz(0.0, 0.0, 0.0),
                ));
                bar.spawn((
                    Sprite {
                        image: icon_image(assets, kind),
                        custom_size: Some(Vec2::splat(24.0)),
                        ..default()
                    },
                    Transform::from_xyz(-36.0, 0.0, 0.1),
                    ResourceIcon(kind),
                ));
                bar.spawn((
                    Text2d::new("0"),
                    TextFont {
                        font: asset_server.load(FONT),
                        font_size: 20.0,
                        ..default()
                    },
                    TextColor(Color::WHITE),
                    Transform::from_xyz(10.0, 0.0, 0.1),
                    ResourceLabel(kind),
                ));
            });
    }
}

fn spawn_mine(
    commands: &mut Commands,
    assets: &GameAssets,
    layouts: &mut Assets<TextureAtlasLayout>,
) {
    let smoke_layout = layouts.add(TextureAtlasLayout::from_grid(
        UVec2::new(64, 64),
        SMOKE_FRAMES as u32,
        1,
        None,
        None,
    ));
    commands
        .spawn((
            Mine,
            Transform::from_translation(MINE_POS.extend(Z_MINE)),
            Visibility::Hidden,
        ))
        .with_children(|mine| {
            mine.spawn((
                Sprite {
                    image: assets.mine.clone(),
                    custom_size: Some(Vec2::splat(128.0)),
                    ..default()
                },
                Transform::from_xyz(0.0, 0.0, 0.0),
                MineBody,
            ));
            let mut smoke_sprite = Sprite::from_atlas_image(
                assets.smoke_sheet.clone(),
                TextureAtlas {
                    layout: smoke_layout,
                    index: 0,
                },
            );
            smoke_sprite.color.set_alpha(0.4);
            mine.spawn((
                smoke_sprite,
                Transform::from_xyz(0.0, 36.0, 0.1),
                Visibility::Hidden,
                AtlasAnimation::one_shot(SMOKE_FRAMES, SMOKE_FPS),
                MineSmoke,
            ));
        });
}

fn spawn_slot(
    commands: &mut Commands,
    assets: &GameAssets,
    goblin_layout: &Handle<TextureAtlasLayout>,
    position: Vec2,
    tier: GoblinTier,
    index: usize,
) -> Entity {
    let slot = commands
        .spawn((
            GoblinSlot {
                tier,
                hidden: false,
            },
            SlotIndex(index),
            Transform::from_translation(position.extend(Z_SLOT_BASE + index as f32 * 0.1)),
            Visibility::default(),
        ))
        .id();

    let ring = commands
        .spawn((
            Sprite::from_image(assets.shine.clone()),
            Transform::from_xyz(0.0, 0.0, -0.1).with_scale(Vec3::splat(0.0)),
            ShineRing,
        ))
        .id();

    let ore = commands
        .spawn((
            Sprite {
                image: if index % 2 == 0 {
                    assets.ore_copper.clone()
                } else {
                    assets.ore_iron.clone()
                },
                custom_size: Some(Vec2::splat(36.0)),
                ..default()
            },
            Transform::from_xyz(14.0, -16.0, 0.05),
        ))
        .id();

    // Goblins start their swing on a random frame so the idle line does not
    // look like a chorus.
    let base = commands
        .spawn((
            Sprite::from_atlas_image(
                assets.goblin_sheet.clone(),
                TextureAtlas {
                    layout: goblin_layout.clone(),
                    index: fastrand::usize(..GOBLIN_FRAMES),
                },
            ),
            Transform::from_xyz(0.0, 0.0, 0.2),
            AtlasAnimation::repeating(GOBLIN_FRAMES, GOBLIN_FPS),
            tier,
            Goblin { slot },
            RewardEmitter::default(),
        ))
        .id();

    let mut upgrade_animation = AtlasAnimation::repeating(GOBLIN_FRAMES, GOBLIN_FPS);
    upgrade_animation.playing = false;
    let upgrade = commands
        .spawn((
            Sprite::from_atlas_image(
                assets.goblin_sheet.clone(),
                TextureAtlas {
                    layout: goblin_layout.clone(),
                    index: 0,
                },
            ),
            Transform::from_xyz(0.0, 0.0, 0.2).with_scale(Vec3::splat(1.2)),
            Visibility::Hidden,
            upgrade_animation,
            GoblinTier::Upgraded,
            Goblin { slot },
            RewardEmitter::default(),
        ))
        .id();

    commands
        .entity(slot)
        .add_children(&[ring, ore, base, upgrade])
        .insert(SlotSprites {
            ring,
            ore,
            base,
            upgrade,
        });
    slot
}

fn spawn_chest(commands: &mut Commands, assets: &GameAssets, position: Vec2, index: usize) {
    let (closed_image, open_image) = assets.chest_images(index);

    let chest = commands
        .spawn((
            Chest { opened: false },
            ChestIndex(index),
            Transform::from_translation(position.extend(Z_CHEST)),
            Visibility::Hidden,
        ))
        .id();

    let closed = commands
        .spawn((
            Sprite::from_image(closed_image),
            Transform::from_xyz(0.0, 0.0, 0.0),
        ))
        .id();

    let open = commands
        .spawn((
            Sprite::from_image(open_image),
            Transform::from_xyz(0.0, 0.0, 0.0),
            Visibility::Hidden,
        ))
        .id();

    // Closed chests breathe until opened.
    spawn_seq(
        commands,
        TweenSeq::looping(
            closed,
            vec![
                TweenStep::scale(Vec2::ONE, Vec2::new(1.05, 0.9), 0.6, Ease::SineInOut),
                TweenStep::scale(Vec2::new(1.05, 0.9), Vec2::ONE, 0.6, Ease::SineInOut),
            ],
        ),
    );

    commands
        .entity(chest)
        .add_children(&[closed, open])
        .insert(ChestSprites { closed, open });
}

fn spawn_finish_overlay(commands: &mut Commands, assets: &GameAssets) {
    commands
        .spawn((
            FinishOverlay,
            Transform::from_xyz(0.0, 0.0, Z_FINISH),
            Visibility::Hidden,
        ))
        .with_children(|overlay| {
            overlay.spawn((
                Sprite::from_color(
                    Color::srgba(0.8, 0.8, 0.8, 0.0),
                    Vec2::new(WINDOW_WIDTH, WINDOW_HEIGHT),
                ),
                Transform::from_xyz(0.0, 0.0, 0.0),
                FinishBackdrop,
            ));
            overlay.spawn((
                Sprite::from_image(assets.logo.clone()),
                Transform::from_xyz(0.0, 90.0, 0.1).with_scale(Vec3::splat(0.0)),
                FinishLogo,
            ));
            overlay.spawn((
                Sprite::from_image(assets.cta.clone()),
                Transform::from_xyz(0.0, -60.0, 0.1).with_scale(Vec3::splat(0.0)),
                FinishCta,
            ));
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(
            SceneConfig::default().validate().is_ok(),
            "the shipped layout must pass its own validation"
        );
    }

    #[test]
    fn lone_slot_is_rejected() {
        let config = SceneConfig {
            slots: vec![(Vec2::ZERO, GoblinTier::TierA)],
            chests: vec![Vec2::ZERO],
        };
        assert!(matches!(
            config.validate(),
            Err(SceneError::NotEnoughSlots(1))
        ));
    }

    #[test]
    fn unmergeable_tiers_are_rejected() {
        let config = SceneConfig {
            slots: vec![
                (Vec2::ZERO, GoblinTier::TierA),
                (Vec2::new(50.0, 0.0), GoblinTier::TierB),
            ],
            chests: vec![Vec2::ZERO],
        };
        assert!(matches!(config.validate(), Err(SceneError::NoMergeablePair)));
    }

    #[test]
    fn offscreen_slot_is_rejected() {
        let config = SceneConfig {
            slots: vec![
                (Vec2::ZERO, GoblinTier::TierA),
                (Vec2::new(5000.0, 0.0), GoblinTier::TierA),
            ],
            chests: vec![Vec2::ZERO],
        };
        assert!(matches!(
            config.validate(),
            Err(SceneError::SlotOutOfBounds { index: 1, .. })
        ));
    }
}
