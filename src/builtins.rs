//! ビルトインコマンドの実装。
//!
//! ビルトインは呼び出し元プロセスの状態（カレントディレクトリ）を書き換える
//! 必要があるため、単段パイプラインでは fork せず本体プロセスで実行する。
//! 複数段パイプラインの一部として現れた場合は fork 済みの子プロセス内で
//! 実行され、効果はその子に閉じる。どちらの呼び出し元からも使えるよう、
//! ディスパッチは共有状態を持たない。
//!
//! `try_exec()` が `Some(status)` を返せばビルトインとして処理済み、
//! `None` なら外部コマンドとして executor に委ねる。

use std::env;
use std::path::Path;

/// ビルトインコマンドの実行を試みる。
///
/// 前提: `args` は空でない（パーサーの不変条件）。
///
/// 戻り値:
/// - `Some(0)` — ビルトイン成功
/// - `Some(1)` — ビルトイン失敗（診断は stderr へ出力済み）
/// - `None` — 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn try_exec(args: &[String]) -> Option<i32> {
    match args[0].as_str() {
        "cd" => Some(builtin_cd(args)),
        _ => None,
    }
}

/// `cd <dir>` — カレントディレクトリを変更する。引数はちょうど 1 個。
fn builtin_cd(args: &[String]) -> i32 {
    if args.len() != 2 {
        eprintln!("error: cd: bad arguments");
        return 1;
    }
    if env::set_current_dir(Path::new(&args[1])).is_err() {
        eprintln!("error: cd: cannot change directory to {}", args[1]);
        1
    } else {
        0
    }
}

// ── Tests ───────────────────────────────────────────────────────────
