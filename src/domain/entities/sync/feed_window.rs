use super::feed_item::FeedItem;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 表示順に並んだフィード要素と、ページング状態。id の重複は持たない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedWindow {
    items: Vec<FeedItem>,
    has_more: bool,
}

impl FeedWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 先頭ページから構築する。満杯のページなら続きがあるとみなす。
    pub fn from_page(page: Vec<FeedItem>, page_size: usize) -> Self {
        let has_more = page.len() >= page_size;
        Self {
            items: dedup_by_id(page),
            has_more,
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<FeedItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    /// 次ページ取得のオフセット
    pub fn offset(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, id: &str) -> Option<&FeedItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    /// 先頭 `n` 件
    pub fn head(&self, n: usize) -> &[FeedItem] {
        &self.items[..n.min(self.items.len())]
    }

    /// 追加ページをマージする。既存 id は元の位置と値を維持する。
    /// 追加された id を返す。
    pub fn append_page(&mut self, page: Vec<FeedItem>, page_size: usize) -> Vec<String> {
        self.has_more = page.len() >= page_size;

        let mut seen: HashSet<String> = self.items.iter().map(|item| item.id.clone()).collect();
        let mut appended = Vec::new();
        for item in page {
            if seen.insert(item.id.clone()) {
                appended.push(item.id.clone());
                self.items.push(item);
            }
        }
        appended
    }

    /// 新規作成された要素を先頭に入れる。既に存在する場合はその場で置き換える。
    pub fn prepend(&mut self, item: FeedItem) -> bool {
        if self.replace(item.clone()) {
            return false;
        }
        self.items.insert(0, item);
        true
    }

    /// 同じ id の要素を置き換える。存在しなければ何もしない。
    pub fn replace(&mut self, item: FeedItem) -> bool {
        match self.items.iter_mut().find(|current| current.id == item.id) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<FeedItem> {
        let position = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(position))
    }

    /// 先頭部分を `head` で差し替え、残りは重複を除いて維持する。
    /// 後続ページを読み込み済みなら、新しい先頭から押し出された旧先頭の要素は
    /// 先頭と後続の間に残す（削除の確認は個別の再取得で行う）。
    pub fn replace_head(&mut self, head: Vec<FeedItem>, page_size: usize) {
        let head = dedup_by_id(head);
        let old_head_len = page_size.min(self.items.len());
        let head_ids: HashSet<String> = head.iter().map(|item| item.id.clone()).collect();
        let tail: Vec<FeedItem> = self.items[old_head_len..]
            .iter()
            .filter(|item| !head_ids.contains(item.id.as_str()))
            .cloned()
            .collect();

        let mut items = head;
        if tail.is_empty() {
            self.has_more = items.len() >= page_size;
        } else {
            let displaced: Vec<FeedItem> = self.items[..old_head_len]
                .iter()
                .filter(|item| !head_ids.contains(item.id.as_str()))
                .cloned()
                .collect();
            items.extend(displaced);
        }
        items.extend(tail);
        self.items = items;
    }

    /// `before` と比べて内容が変わった・増えた・消えた id
    pub fn changed_ids(before: &[FeedItem], after: &[FeedItem]) -> Vec<String> {
        let previous: HashMap<&str, &FeedItem> =
            before.iter().map(|item| (item.id.as_str(), item)).collect();
        let current: HashSet<&str> = after.iter().map(|item| item.id.as_str()).collect();

        let mut changed: Vec<String> = after
            .iter()
            .filter(|item| previous.get(item.id.as_str()).copied() != Some(*item))
            .map(|item| item.id.clone())
            .collect();
        changed.extend(
            before
                .iter()
                .filter(|item| !current.contains(item.id.as_str()))
                .map(|item| item.id.clone()),
        );
        changed
    }
}

/// 最初に現れた要素を残して id の重複を取り除く
pub fn dedup_by_id(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}
