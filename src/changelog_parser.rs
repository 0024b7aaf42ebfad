use crate::models::{ChangeEntry, FieldType, History, HistoryItem};

/// カスタムフィールドIDの接頭辞
pub const CUSTOM_FIELD_PREFIX: &str = "customfield_";

/// JIRAのchangelogを平坦化するパーサー
pub struct ChangelogParser;

impl ChangelogParser {
    /// 変更グループ列を1項目1レコードに展開する
    ///
    /// 各レコードはグループの `id`・作成者・日時を引き継ぐ。並び順は上流のまま。
    pub fn flatten(histories: &[History]) -> Vec<ChangeEntry> {
        histories
            .iter()
            .flat_map(|history| {
                let author = history.author.as_ref().and_then(|a| a.label());
                history.items.iter().map(move |item| ChangeEntry {
                    change_id: history.id.clone(),
                    author: author.clone(),
                    created: history.created.clone(),
                    field_name: item.field.clone().unwrap_or_default(),
                    field_type: Self::field_type(item),
                    from_value: item.from.clone(),
                    to_value: item.to.clone(),
                    from_string: item.from_string.clone(),
                    to_string: item.to_string.clone(),
                })
            })
            .collect()
    }

    /// フィールドIDが `customfield_` で始まればカスタムフィールド
    ///
    /// `fieldId` を返さない古いサーバーでは `fieldtype` で判定する。
    pub fn field_type(item: &HistoryItem) -> FieldType {
        match item.field_id.as_deref() {
            Some(id) if id.starts_with(CUSTOM_FIELD_PREFIX) => FieldType::Custom,
            Some(_) => FieldType::JiraSystem,
            None if item.field_type.as_deref() == Some("custom") => FieldType::Custom,
            None => FieldType::JiraSystem,
        }
    }
}
