use bevy::prelude::*;
use bevy_asset_loader::prelude::*;

/// Frames in the goblin pickaxe-swing sheet.
pub const GOBLIN_FRAMES: usize = 8;
/// Frames in the mine smoke puff sheet.
pub const SMOKE_FRAMES: usize = 6;
/// Frame of the pickaxe swing on which a working goblin releases a coin.
pub const EMIT_FRAME: usize = 5;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Default, States)]
pub enum AssetState {
    #[default]
    Loading,
    Ready,
}

#[derive(AssetCollection, Resource)]
pub struct GameAssets {
    #[asset(path = "sprites/background.png")]
    pub background: Handle<Image>,
    #[asset(path = "sprites/goblin_pickaxe.png")]
    pub goblin_sheet: Handle<Image>,
    #[asset(path = "sprites/smoke.png")]
    pub smoke_sheet: Handle<Image>,
    #[asset(path = "sprites/mine.png")]
    pub mine: Handle<Image>,
    #[asset(path = "sprites/ore_copper.png")]
    pub ore_copper: Handle<Image>,
    #[asset(path = "sprites/ore_iron.png")]
    pub ore_iron: Handle<Image>,
    #[asset(path = "sprites/coin.png")]
    pub coin: Handle<Image>,
    #[asset(path = "sprites/gem.png")]
    pub gem: Handle<Image>,
    #[asset(path = "sprites/potion.png")]
    pub potion: Handle<Image>,
    #[asset(path = "sprites/shine_gold.png")]
    pub shine: Handle<Image>,
    #[asset(path = "sprites/chest_wood_closed.png")]
    pub chest_wood_closed: Handle<Image>,
    #[asset(path = "sprites/chest_wood_open.png")]
    pub chest_wood_open: Handle<Image>,
    #[asset(path = "sprites/chest_iron_closed.png")]
    pub chest_iron_closed: Handle<Image>,
    #[asset(path = "sprites/chest_iron_open.png")]
    pub chest_iron_open: Handle<Image>,
    #[asset(path = "sprites/chest_gold_closed.png")]
    pub chest_gold_closed: Handle<Image>,
    #[asset(path = "sprites/chest_gold_open.png")]
    pub chest_gold_open: Handle<Image>,
    #[asset(path = "sprites/hand.png")]
    pub hand: Handle<Image>,
    #[asset(path = "sprites/logo.png")]
    pub logo: Handle<Image>,
    #[asset(path = "sprites/cta_button.png")]
    pub cta: Handle<Image>,
    #[asset(path = "sprites/install_button.png")]
    pub install_button: Handle<Image>,
    #[asset(path = "sprites/free_badge.png")]
    pub free_badge: Handle<Image>,
}

impl GameAssets {
    pub fn chest_images(&self, index: usize) -> (Handle<Image>, Handle<Image>) {
        match index {
            0 => (self.chest_wood_closed.clone(), self.chest_wood_open.clone()),
            1 => (self.chest_iron_closed.clone(), self.chest_iron_open.clone()),
            _ => (self.chest_gold_closed.clone(), self.chest_gold_open.clone()),
        }
    }
}

pub struct GameAssetsPlugin;

impl Plugin for GameAssetsPlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<AssetState>().add_loading_state(
            LoadingState::new(AssetState::Loading)
                .continue_to_state(AssetState::Ready)
                .load_collection::<GameAssets>(),
        );
    }
}
