//! パイプライン実行: pipe 作成、fork、fd 配線、waitpid、ステータス集約。
//!
//! 実行の流れ（N 段パイプライン）:
//! 1. 単段かつビルトイン → fork せず本体プロセス内で実行（`cd` の効果を
//!    本体に残すため）
//! 2. それ以外は左から右へ 1 段ずつ: 後続ステージがあれば pipe 作成 →
//!    fork → 子で stdin/stdout を dup2 配線 → ビルトイン判定 → execv
//! 3. 全段 fork 後、ステージ順に waitpid し、最終段のステータスを
//!    パイプラインのステータスとする（途中段の失敗は診断のみ）
//!
//! fd の規律: [`Fd`] の RAII で「使い終わった端は即 close」を親子両側で
//! 守る。書き込み側の全コピーが閉じてはじめて読み手が EOF を観測できる。
//! 本体プロセスはパイプ I/O には一切参加せず、waitpid でのみブロックする。

use std::ffi::CString;
use std::io;
use std::process;

use crate::builtins;
use crate::parser::{Command, Pipeline};
use crate::FatalError;

// ── Fd ──────────────────────────────────────────────────────────────

/// パイプ端の RAII ラッパー。drop で close する。
struct Fd(libc::c_int);

impl Fd {
    fn raw(&self) -> libc::c_int {
        self.0
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// 匿名パイプを作成し、(読み端, 書き端) を返す。
fn pipe() -> Result<(Fd, Fd), FatalError> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(FatalError::Pipe(io::Error::last_os_error()));
    }
    Ok((Fd(fds[0]), Fd(fds[1])))
}

// ── CStringVec ──────────────────────────────────────────────────────

/// execv 用の NUL 終端ポインタ配列。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringVec {
    /// 引数リストから構築する。内部 NUL を含む引数は空文字列に落とす。
    fn from_args(args: &[String]) -> Self {
        let strings: Vec<CString> = args
            .iter()
            .map(|s| CString::new(s.as_str()).unwrap_or_else(|_| CString::new("").unwrap()))
            .collect();
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null()); // NULL 終端
        Self {
            _strings: strings,
            ptrs,
        }
    }

    /// NUL 終端ポインタ配列を返す。
    fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

// ── 子プロセス側 ────────────────────────────────────────────────────

/// fork 後の子プロセス側。stdin/stdout を配線してコマンドを実行する。戻らない。
///
/// - `stdin_pipe`: 先行ステージのパイプの読み端（先頭ステージなら `None`）
/// - `unused_read`: 自ステージのパイプの読み端。次段の stdin 用で、この子では
///   使わないので即 close する
/// - `stdout_pipe`: 自ステージのパイプの書き端（最終ステージなら `None`）
fn run_stage(
    command: &Command,
    stdin_pipe: Option<Fd>,
    unused_read: Option<Fd>,
    stdout_pipe: Option<Fd>,
) -> ! {
    if let Some(fd) = stdin_pipe {
        if unsafe { libc::dup2(fd.raw(), libc::STDIN_FILENO) } < 0 {
            process::exit(1);
        }
        // drop で dup2 元の fd を close
    }
    drop(unused_read);
    if let Some(fd) = stdout_pipe {
        if unsafe { libc::dup2(fd.raw(), libc::STDOUT_FILENO) } < 0 {
            process::exit(1);
        }
    }

    // パイプライン中のビルトインは子プロセス内で実行し、効果は子に閉じる
    if let Some(status) = builtins::try_exec(&command.args) {
        process::exit(status);
    }

    // Rust ランタイムは SIGPIPE を無視している。外部プログラムには
    // デフォルト動作で継承させる。
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    // 環境はそのまま継承。パス解決は execv のリテラル解決のみ
    //（シェル的な PATH 検索はしない）。
    let argv = CStringVec::from_args(&command.args);
    unsafe {
        libc::execv(argv.as_ptr().read(), argv.as_ptr());
    }

    // execv が戻った = 起動失敗
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    eprintln!("error: cannot execute {}", command.args[0]);
    process::exit(match errno {
        libc::ENOENT => 127,
        libc::EACCES => 126,
        _ => 1,
    });
}

// ── 親プロセス側 ────────────────────────────────────────────────────

/// 全ステージを左から右へ fork して配線し、各ステージの pid を返す。
fn spawn_stages(pipeline: &Pipeline) -> Result<Vec<libc::pid_t>, FatalError> {
    let stage_count = pipeline.commands.len();
    let mut pids = Vec::with_capacity(stage_count);
    // 先行ステージのパイプの読み端。次にforkする子の stdin になる。
    let mut prev_read: Option<Fd> = None;

    for (i, command) in pipeline.commands.iter().enumerate() {
        let has_next = i + 1 < stage_count;
        let (next_read, write_end) = if has_next {
            let (r, w) = pipe()?;
            (Some(r), Some(w))
        } else {
            (None, None)
        };

        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(FatalError::Fork(io::Error::last_os_error()));
        }
        if pid == 0 {
            run_stage(command, prev_read, next_read, write_end);
        }

        // 親側: 使い終わった端を即 close（drop）。先行読み端はこの段で
        // 消費済み。書き端は子が保持しており、親が持ち続けると次段が
        // EOF を観測できない。
        drop(prev_read);
        drop(write_end);
        prev_read = next_read;
        pids.push(pid);
    }
    Ok(pids)
}

/// ステージ順に waitpid し、最終段のステータスを返す。
///
/// wait の順序は完了順序を意味しないが、パイプラインの結果として使うのは
/// どの子が先に終了したかに関わらず最終段のステータスのみ。
fn wait_stages(pids: &[libc::pid_t]) -> i32 {
    let mut last = 0;
    for &pid in pids {
        let mut raw: libc::c_int = 0;
        if unsafe { libc::waitpid(pid, &mut raw, 0) } < 0 {
            continue;
        }
        last = decode_status(raw);
    }
    last
}

/// waitpid の生ステータスを終了コードに変換する。
/// シグナル終了は慣例に従い 128 + シグナル番号。
fn decode_status(raw: libc::c_int) -> i32 {
    if libc::WIFEXITED(raw) {
        libc::WEXITSTATUS(raw)
    } else if libc::WIFSIGNALED(raw) {
        128 + libc::WTERMSIG(raw)
    } else {
        1
    }
}

// ── 公開 API ────────────────────────────────────────────────────────

/// 単一パイプラインを実行し、終了ステータスを返す。
///
/// 単段かつビルトインなら fork せず本体プロセスで実行する。先に fork して
/// しまうと `cd` の効果が本体から見えなくなるため、この判定が先に立つ。
pub fn execute_pipeline(pipeline: &Pipeline) -> Result<i32, FatalError> {
    if pipeline.commands.len() == 1 {
        if let Some(status) = builtins::try_exec(&pipeline.commands[0].args) {
            return Ok(status);
        }
    }
    let pids = spawn_stages(pipeline)?;
    Ok(wait_stages(&pids))
}

/// `;` 区切りのパイプライン列を順に実行し、最後のパイプラインの
/// ステータスを返す。列が空なら 0。
///
/// 各パイプラインは完走してから次に進む。パイプライン間の並行性はない。
pub fn execute(pipelines: &[Pipeline]) -> Result<i32, FatalError> {
    let mut last = 0;
    for pipeline in pipelines {
        last = execute_pipeline(pipeline)?;
    }
    Ok(last)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    /// ステージごとの引数リストから Pipeline を 1 本組み立てる。
    fn pipeline(stages: &[&[&str]]) -> Pipeline {
        Pipeline {
            commands: stages
                .iter()
                .map(|args| Command {
                    args: args.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        }
    }

    /// テスト用の一時ファイルパス（テスト名で一意化）。
    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("psh_{}_{}", name, std::process::id()))
    }

    // ── 外部コマンド ──

    #[test]
    fn external_exit_status_passes_through() {
        assert_eq!(execute_pipeline(&pipeline(&[&["/bin/true"]])).unwrap(), 0);
        assert_eq!(execute_pipeline(&pipeline(&[&["/bin/false"]])).unwrap(), 1);
    }

    #[test]
    fn environment_is_inherited() {
        std::env::set_var("PSH_TEST_MARKER", "v");
        let p = pipeline(&[&["/bin/sh", "-c", "test \"$PSH_TEST_MARKER\" = v"]]);
        assert_eq!(execute_pipeline(&p).unwrap(), 0);
    }

    #[test]
    fn unknown_program_is_a_launch_failure() {
        assert_eq!(
            execute_pipeline(&pipeline(&[&["/no/such/program"]])).unwrap(),
            127,
        );
    }

    #[test]
    fn launch_failure_mid_pipeline_does_not_poison_last_stage() {
        let p = pipeline(&[&["/no/such/program"], &["/bin/true"]]);
        assert_eq!(execute_pipeline(&p).unwrap(), 0);
    }

    // ── パイプライン ──

    #[test]
    fn pipeline_status_is_last_stage_only() {
        let p = pipeline(&[&["/bin/false"], &["/bin/true"]]);
        assert_eq!(execute_pipeline(&p).unwrap(), 0);
        let p = pipeline(&[&["/bin/true"], &["/bin/false"]]);
        assert_eq!(execute_pipeline(&p).unwrap(), 1);
    }

    #[test]
    fn stage_stdout_feeds_next_stage_stdin() {
        let out = temp_path("pipe2");
        let p = Pipeline {
            commands: vec![
                Command {
                    args: tokens(&["/bin/echo", "alpha"]),
                },
                Command {
                    args: vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        format!("cat > {}", out.display()),
                    ],
                },
            ],
        };
        assert_eq!(execute_pipeline(&p).unwrap(), 0);
        let content = fs::read_to_string(&out).unwrap();
        fs::remove_file(&out).ok();
        assert_eq!(content, "alpha\n");
    }

    #[test]
    fn three_stage_pipeline_delivers_verbatim() {
        let out = temp_path("pipe3");
        let p = Pipeline {
            commands: vec![
                Command {
                    args: tokens(&["/bin/echo", "one two"]),
                },
                Command {
                    args: tokens(&["/bin/cat"]),
                },
                Command {
                    args: vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        format!("cat > {}", out.display()),
                    ],
                },
            ],
        };
        assert_eq!(execute_pipeline(&p).unwrap(), 0);
        let content = fs::read_to_string(&out).unwrap();
        fs::remove_file(&out).ok();
        assert_eq!(content, "one two\n");
    }

    // ── `;` 区切り ──

    #[test]
    fn sequenced_pipelines_report_last_status() {
        let list = parse(&tokens(&["/bin/false", ";", "/bin/true"])).unwrap();
        assert_eq!(execute(&list).unwrap(), 0);
        let list = parse(&tokens(&["/bin/true", ";", "/bin/false"])).unwrap();
        assert_eq!(execute(&list).unwrap(), 1);
    }

    #[test]
    fn sequenced_pipelines_run_in_order() {
        let out = temp_path("seq");
        fs::remove_file(&out).ok();
        let first = format!("echo a >> {}", out.display());
        let second = format!("echo b >> {}", out.display());
        let list = parse(&tokens(&[
            "/bin/sh", "-c", &first, ";", "/bin/sh", "-c", &second,
        ]))
        .unwrap();
        assert_eq!(execute(&list).unwrap(), 0);
        let content = fs::read_to_string(&out).unwrap();
        fs::remove_file(&out).ok();
        assert_eq!(content, "a\nb\n");
    }

    #[test]
    fn builtin_failure_does_not_abort_the_sequence() {
        let list = parse(&tokens(&["cd", "a", "b", ";", "/bin/true"])).unwrap();
        assert_eq!(execute(&list).unwrap(), 0);
        let list = parse(&tokens(&["/bin/true", ";", "cd", "a", "b"])).unwrap();
        assert_eq!(execute(&list).unwrap(), 1);
    }

    // ── ビルトインの実行場所 ──

    /// cwd を触る検証はこの 1 本に集約する（テストは並列実行されるため、
    /// 分割すると cwd の観測が互いに干渉する）。
    #[test]
    fn cd_effect_scope_depends_on_pipeline_shape() {
        let before = std::env::current_dir().unwrap();
        let target = std::env::temp_dir().canonicalize().unwrap();

        // 複数段: ビルトインは子プロセス内で実行され、本体の cwd は変わらない。
        // ステータスは最終段（/bin/true）のもの。
        let piped = Pipeline {
            commands: vec![
                Command {
                    args: vec!["cd".to_string(), target.display().to_string()],
                },
                Command {
                    args: tokens(&["/bin/true"]),
                },
            ],
        };
        assert_eq!(execute_pipeline(&piped).unwrap(), 0);
        assert_eq!(std::env::current_dir().unwrap(), before);

        // 単段: 本体プロセスの cwd が変わり、後続のパイプラインまで持続する
        let single = Pipeline {
            commands: vec![Command {
                args: vec!["cd".to_string(), target.display().to_string()],
            }],
        };
        assert_eq!(execute_pipeline(&single).unwrap(), 0);
        assert_eq!(std::env::current_dir().unwrap().canonicalize().unwrap(), target);

        std::env::set_current_dir(&before).unwrap();
    }
}
