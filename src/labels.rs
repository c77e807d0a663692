//! クラスラベル定義
//!
//! 英数字38文字とクラスID (0〜37) の対応表です。
//! 手書き文字データセットのディレクトリ名はこの記号と一致している必要があります。

/// クラス数
pub const NUM_CLASSES: usize = 38;

/// クラスID順の記号一覧
///
/// `I`/`i` と `L`/`l` は字形が異なるため別クラスとして扱う
pub const CLASS_SYMBOLS: [&str; NUM_CLASSES] = [
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9",
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "i",
    "J", "K", "L", "l", "M", "N", "O", "P", "Q", "R",
    "S", "T", "U", "V", "W", "X", "Y", "Z",
];

/// 記号からクラスIDを取得
pub fn label_for_symbol(symbol: &str) -> Option<usize> {
    CLASS_SYMBOLS.iter().position(|s| *s == symbol)
}

/// クラスIDから記号を取得
pub fn symbol_for_label(label: usize) -> Option<&'static str> {
    CLASS_SYMBOLS.get(label).copied()
}

/// 全クラスの記号を所有文字列で返す（メタデータ保存用）
pub fn class_labels() -> Vec<String> {
    CLASS_SYMBOLS.iter().map(|s| s.to_string()).collect()
}
