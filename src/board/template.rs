use serde::{Deserialize, Serialize};

use crate::board::tile::*;

/// Template content language. Only the text differs; the layout algorithm is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ja,
    En,
}

impl Language {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "ja" => Some(Language::Ja),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

struct TemplateTile {
    title: &'static str,
    tile_type: TileType,
    event_seed: &'static str,
    effect: Effect,
    icon_prompt: &'static str,
}

struct TemplateSet {
    theme: &'static str,
    tone: &'static str,
    art_style_prompt: &'static str,
    tiles: &'static [TemplateTile],
    goal_title: &'static str,
    goal_event_seed: &'static str,
}

const fn entry(
    title: &'static str,
    tile_type: TileType,
    event_seed: &'static str,
    effect_type: EffectType,
    value: i64,
    icon_prompt: &'static str,
) -> TemplateTile {
    TemplateTile {
        title,
        tile_type,
        event_seed,
        effect: Effect {
            effect_type,
            value,
        },
        icon_prompt,
    }
}

const JA_TILES: &[TemplateTile] = &[
    entry("朝礼スタート", TileType::Normal, "今日の目標を宣言して士気アップ", EffectType::None, 0, "Morning standup with team around whiteboard"),
    entry("環境構築", TileType::Event, "依存関係の地雷を回避できた", EffectType::Advance, 1, "Terminal setup check marks and package icons"),
    entry("仕様迷子", TileType::Penalty, "要件を読み直して1マス戻る", EffectType::Retreat, 1, "Confused roadmap and sticky notes"),
    entry("神レビュー", TileType::Bonus, "レビューで改善点が一気に見えた", EffectType::Advance, 2, "Code review with green check marks"),
    entry("集中ゾーン", TileType::Normal, "無音タイムで実装が進む", EffectType::Score, 1, "Focused coder with headphones"),
    entry("ビルド失敗", TileType::Penalty, "型エラー祭りで足止め", EffectType::Retreat, 2, "Red CI failed badge and broken build"),
    entry("助っ人参上", TileType::Rescue, "チームメイトの助言で復活", EffectType::Advance, 2, "Teammate helping fix bug"),
    entry("デモ練習", TileType::Event, "発表台本がまとまり自信がついた", EffectType::Score, 2, "Pitch practice with timer and slides"),
    entry("最終調整", TileType::Normal, "UIの見た目を整えて完成度アップ", EffectType::None, 0, "UI polishing with color palette"),
];

const EN_TILES: &[TemplateTile] = &[
    entry("Kickoff", TileType::Normal, "Share today's goal and boost morale", EffectType::None, 0, "Morning standup with team around whiteboard"),
    entry("Dev Setup", TileType::Event, "Dodged a dependency landmine", EffectType::Advance, 1, "Terminal setup check marks and package icons"),
    entry("Spec Maze", TileType::Penalty, "Re-read the requirements, back 1", EffectType::Retreat, 1, "Confused roadmap and sticky notes"),
    entry("Great Review", TileType::Bonus, "A review made the fixes obvious", EffectType::Advance, 2, "Code review with green check marks"),
    entry("Focus Zone", TileType::Normal, "Quiet time moves the build forward", EffectType::Score, 1, "Focused coder with headphones"),
    entry("Build Broke", TileType::Penalty, "Stuck in a flood of type errors", EffectType::Retreat, 2, "Red CI failed badge and broken build"),
    entry("Helper Here", TileType::Rescue, "A teammate's tip gets you going", EffectType::Advance, 2, "Teammate helping fix bug"),
    entry("Demo Drill", TileType::Event, "The pitch script finally clicks", EffectType::Score, 2, "Pitch practice with timer and slides"),
    entry("Polish", TileType::Normal, "Tidy the UI and raise the bar", EffectType::None, 0, "UI polishing with color palette"),
];

const JA_SET: TemplateSet = TemplateSet {
    theme: "ハッカソン緊急リカバリー作戦",
    tone: "ドタバタ",
    art_style_prompt: "Colorful hackathon command center with sticky notes, laptops, and cheerful chaos",
    tiles: JA_TILES,
    goal_title: "ピッチ本番",
    goal_event_seed: "審査員へ最高のデモを披露",
};

const EN_SET: TemplateSet = TemplateSet {
    theme: "Hackathon Rescue Mission",
    tone: "Chaotic fun",
    art_style_prompt: "Colorful hackathon command center with sticky notes, laptops, and cheerful chaos",
    tiles: EN_TILES,
    goal_title: "Final Pitch",
    goal_event_seed: "Show the judges your best demo",
};

fn template_set(language: Language) -> &'static TemplateSet {
    match language {
        Language::Ja => &JA_SET,
        Language::En => &EN_SET,
    }
}

/// Build the offline fallback board in the default (Japanese) template.
pub fn create_template_board(requested_tile_count: i64) -> BoardSpec {
    create_template_board_for(requested_tile_count, Language::Ja)
}

/// Build a deterministic board by cycling the template entries.
///
/// The final tile always carries the goal content and a neutral effect, but
/// keeps the icon prompt of the entry it cycled onto.
pub fn create_template_board_for(requested_tile_count: i64, language: Language) -> BoardSpec {
    let set = template_set(language);
    let tile_count = clamp_tile_count(requested_tile_count);
    let last = tile_count - 1;

    let tiles = (0..tile_count)
        .map(|i| {
            let source = &set.tiles[i % set.tiles.len()];
            let mut tile = BoardTile {
                id: (i + 1) as u32,
                title: source.title.to_string(),
                tile_type: source.tile_type,
                event_seed: source.event_seed.to_string(),
                effect: source.effect,
                icon_prompt: source.icon_prompt.to_string(),
            };
            if i == last {
                tile.title = set.goal_title.to_string();
                tile.tile_type = TileType::Goal;
                tile.event_seed = set.goal_event_seed.to_string();
                tile.effect = Effect::NEUTRAL;
            }
            tile
        })
        .collect();

    BoardSpec {
        world: World {
            theme: set.theme.to_string(),
            tone: set.tone.to_string(),
            art_style_prompt: set.art_style_prompt.to_string(),
        },
        tiles,
    }
}
