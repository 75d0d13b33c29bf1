//! Stream pumping against real child processes spawned through `sh`.

#![cfg(unix)]

use std::io::Write;
use std::process::Command;
use std::time::Duration;

use procstream::core::encoding::Encoding;
use procstream::core::guard::GuardViolation;
use procstream::core::types::StreamKind;
use procstream::io::child::{ChildHost, Redirects};
use procstream::io::config::StreamConfig;
use procstream::io::process::StreamedProcess;
use procstream::test_support::{EventLog, lines};

const WAIT: Duration = Duration::from_secs(30);

fn sh(script: &str, redirects: Redirects) -> StreamedProcess<ChildHost> {
    sh_with(script, redirects, StreamConfig::default())
}

fn sh_with(script: &str, redirects: Redirects, cfg: StreamConfig) -> StreamedProcess<ChildHost> {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    StreamedProcess::from_command(command, redirects, cfg)
}

const STREAM_SCRIPT: &str = "echo started; echo closed";
const ERROR_SCRIPT: &str = "echo 'started error stream' >&2; echo 'closed error stream' >&2";

#[test]
fn sync_output_stream_reads_to_end() {
    let mut p = sh(STREAM_SCRIPT, Redirects::output_only());
    p.start().expect("start");
    let text = p
        .blocking_reader(StreamKind::Output)
        .expect("reader")
        .read_to_end()
        .expect("read");
    assert!(p.wait_for_exit(Some(WAIT)).expect("wait"));
    assert_eq!(text, "started\nclosed\n");
}

#[test]
fn sync_error_stream_reads_to_end() {
    let mut p = sh(ERROR_SCRIPT, Redirects::error_only());
    p.start().expect("start");
    let text = p
        .blocking_reader(StreamKind::Error)
        .expect("reader")
        .read_to_end()
        .expect("read");
    assert_eq!(text, "started error stream\nclosed error stream\n");
    assert!(p.wait_for_exit(Some(WAIT)).expect("wait"));
}

#[test]
fn async_output_stream_with_and_without_cancel() {
    for cancel in [false, true] {
        let mut p = sh(STREAM_SCRIPT, Redirects::output_only());
        p.start().expect("start");
        let canceller = p.read_canceller(StreamKind::Output).expect("canceller");
        let log = EventLog::new();
        let mut record = log.callback();
        p.on_line(StreamKind::Output, move |event| {
            record(event);
            if cancel {
                let _ = canceller.cancel();
            }
        })
        .expect("on_line");
        p.begin_read(StreamKind::Output).expect("begin_read");

        if p.wait_for_exit(Some(WAIT)).expect("timed wait") {
            p.wait_for_exit(None).expect("wait");
        }

        let expected = if cancel {
            lines(&["started"])
        } else {
            lines(&["started", "closed"])
        };
        assert_eq!(log.texts(), expected, "cancel={cancel}");
        assert_eq!(p.exit_code(), Some(0));
    }
}

#[test]
fn async_error_stream_with_and_without_cancel() {
    for cancel in [false, true] {
        let mut p = sh(ERROR_SCRIPT, Redirects::error_only());
        p.start().expect("start");
        let canceller = p.read_canceller(StreamKind::Error).expect("canceller");
        let log = EventLog::new();
        let mut record = log.callback();
        p.on_line(StreamKind::Error, move |event| {
            record(event);
            if cancel {
                let _ = canceller.cancel();
            }
        })
        .expect("on_line");
        p.begin_read(StreamKind::Error).expect("begin_read");

        if p.wait_for_exit(Some(WAIT)).expect("timed wait") {
            p.wait_for_exit(None).expect("wait");
        }

        let expected = if cancel {
            lines(&["started error stream"])
        } else {
            lines(&["started error stream", "closed error stream"])
        };
        assert_eq!(log.texts(), expected, "cancel={cancel}");
    }
}

#[test]
fn stdin_round_trips_to_output() {
    const MESSAGE: &str = "This string should come as output";
    let mut p = sh("read line; echo \"$line\"", Redirects::output_only().with_stdin());
    let log = EventLog::new();
    p.on_line(StreamKind::Output, log.callback()).expect("on_line");
    p.start().expect("start");
    p.begin_read(StreamKind::Output).expect("begin_read");
    {
        let mut stdin = p.take_stdin().expect("stdin");
        writeln!(stdin, "{MESSAGE}").expect("write stdin");
    }
    assert!(p.wait_for_exit(Some(WAIT)).expect("timed wait"));
    p.wait_for_exit(None).expect("wait");
    assert_eq!(log.texts(), lines(&[MESSAGE]));
}

#[test]
fn utf16_output_written_half_a_character_at_a_time() {
    let cfg = StreamConfig {
        output_encoding: Encoding::Utf16Le,
        ..StreamConfig::default()
    };
    let mut p = sh_with(
        "printf 'a'; sleep 0.1; printf '\\000'",
        Redirects::output_only(),
        cfg,
    );
    let log = EventLog::new();
    p.on_line(StreamKind::Output, log.callback()).expect("on_line");
    p.start().expect("start");
    p.begin_read(StreamKind::Output).expect("begin_read");
    if p.wait_for_exit(Some(WAIT)).expect("timed wait") {
        p.wait_for_exit(None).expect("wait");
    }
    assert_eq!(log.texts(), lines(&["a"]));
}

#[test]
fn both_pumps_drain_before_untimed_wait_returns() {
    let script = "for i in 1 2 3; do echo out $i; echo err $i >&2; done";
    let mut p = sh(script, Redirects::output_and_error());
    let out = EventLog::new();
    let err = EventLog::new();
    let mut record_out = out.callback();
    p.on_line(StreamKind::Output, move |event| {
        std::thread::sleep(Duration::from_millis(10));
        record_out(event);
    })
    .expect("on_line stdout");
    p.on_line(StreamKind::Error, err.callback()).expect("on_line stderr");
    p.start().expect("start");
    p.begin_read(StreamKind::Output).expect("begin stdout");
    p.begin_read(StreamKind::Error).expect("begin stderr");

    assert!(p.wait_for_exit(Some(WAIT)).expect("timed wait"));
    p.wait_for_exit(None).expect("wait");
    assert_eq!(out.texts(), lines(&["out 1", "out 2", "out 3"]));
    assert_eq!(err.texts(), lines(&["err 1", "err 2", "err 3"]));
}

#[test]
fn stream_negative_cases() {
    {
        let mut p = sh(STREAM_SCRIPT, Redirects::output_and_error());
        for kind in StreamKind::ALL {
            assert!(p.blocking_reader(kind).is_err_and(|e| e.is_invalid_state()));
            assert!(p.begin_read(kind).is_err_and(|e| e.is_invalid_state()));
            assert!(p.cancel_read(kind).is_err_and(|e| e.is_invalid_state()));
        }
    }

    {
        let mut p = sh(STREAM_SCRIPT, Redirects::output_and_error());
        p.on_line(StreamKind::Output, |_| {}).expect("on_line");
        p.on_line(StreamKind::Error, |_| {}).expect("on_line");
        p.start().expect("start");
        p.begin_read(StreamKind::Output).expect("begin stdout");
        p.begin_read(StreamKind::Error).expect("begin stderr");
        for kind in StreamKind::ALL {
            let err = p.blocking_reader(kind).err().expect("mixed");
            assert_eq!(err.violation(), Some(GuardViolation::MixedSyncAsync(kind)));
        }
        assert!(p.wait_for_exit(Some(WAIT)).expect("wait"));
    }

    {
        let mut p = sh(STREAM_SCRIPT, Redirects::output_and_error());
        p.start().expect("start");
        let mut output = p.blocking_reader(StreamKind::Output).expect("stdout");
        let _error = p.blocking_reader(StreamKind::Error).expect("stderr");
        for kind in StreamKind::ALL {
            let err = p.begin_read(kind).err().expect("mixed");
            assert_eq!(err.violation(), Some(GuardViolation::MixedSyncAsync(kind)));
        }
        output.read_to_end().expect("drain stdout");
        assert!(p.wait_for_exit(Some(WAIT)).expect("wait"));
    }
}

#[test]
fn timed_out_child_can_be_killed() {
    let mut p = sh("echo begin; exec sleep 30", Redirects::output_only());
    let log = EventLog::new();
    p.on_line(StreamKind::Output, log.callback()).expect("on_line");
    p.start().expect("start");
    p.begin_read(StreamKind::Output).expect("begin_read");
    assert!(!p.wait_for_exit(Some(Duration::from_millis(100))).expect("timed wait"));
    p.kill().expect("kill");
    p.wait_for_exit(None).expect("wait");
    assert_eq!(log.texts(), lines(&["begin"]));
    assert_eq!(p.exit_code(), None);
}
