//! Nested and overlapping sessions.

use std::io::Write;

use stdcapture::core::types::JoinFlags;
use stdcapture::test_support::Targets;
use stdcapture::{CaptureError, LogicalChannel};

use LogicalChannel::{NativeErr, NativeOut, RuntimeErr, RuntimeOut};

#[test]
fn nested_sessions_on_disjoint_channels_stay_apart() {
    let targets = Targets::new().expect("targets");

    // Outer takes native-err + runtime-out, inner takes native-out + runtime-err.
    let outer = targets.redirect().native_out(None).runtime_err(None);
    let inner = targets.redirect().native_err(None).runtime_out(None);

    let outer_session = outer.enter().expect("enter outer");
    targets.native_err.write_all(b"outer-native ").expect("write");

    let ((), inner_output) = inner
        .capture(|| {
            targets.native_out.write_all(b"inner-native ").expect("write");
            targets
                .runtime_err
                .clone()
                .write_all(b"inner-runtime")
                .expect("write");
            targets
                .runtime_out
                .clone()
                .write_all(b"outer-runtime")
                .expect("write");
        })
        .expect("inner capture");

    let outer_output = outer_session.finish().expect("finish outer");

    let inner_bytes = inner_output.get(NativeOut).expect("inner native out");
    assert_eq!(inner_output.get(RuntimeErr), Some(inner_bytes));
    let inner_text = String::from_utf8_lossy(inner_bytes);
    assert!(inner_text.contains("inner-native ") && inner_text.contains("inner-runtime"));
    assert!(!inner_text.contains("outer"));
    assert_eq!(inner_output.get(NativeErr), None);

    let outer_bytes = outer_output.get(NativeErr).expect("outer native err");
    assert_eq!(outer_output.get(RuntimeOut), Some(outer_bytes));
    let outer_text = String::from_utf8_lossy(outer_bytes);
    assert!(outer_text.contains("outer-native ") && outer_text.contains("outer-runtime"));
    assert!(!outer_text.contains("inner"));
    assert_eq!(outer_output.get(NativeOut), None);
}

#[test]
fn overlapping_session_is_rejected_and_outer_keeps_working() {
    let targets = Targets::new().expect("targets");
    let outer = targets.redirect().join(JoinFlags::separate());
    let overlapping = targets
        .redirect()
        .native_out(None)
        .native_err(None)
        .runtime_out(None);

    let session = outer.enter().expect("enter outer");
    let err = overlapping.enter().expect_err("runtime-err already captured");
    assert!(
        matches!(
            err,
            CaptureError::ChannelBusy {
                channel: LogicalChannel::RuntimeErr,
                ..
            }
        ),
        "{err}"
    );

    targets
        .runtime_err
        .clone()
        .write_all(b"still captured")
        .expect("write");
    let output = session.finish().expect("finish");
    assert_eq!(output.get(RuntimeErr), Some(&b"still captured"[..]));

    // Once the outer session is gone the same channel can be captured again.
    let ((), output) = overlapping
        .capture(|| {
            targets
                .runtime_err
                .clone()
                .write_all(b"second")
                .expect("write");
        })
        .expect("capture after release");
    assert_eq!(output.get(RuntimeErr), Some(&b"second"[..]));
    assert!(targets.runtime_err_sink.contents().is_empty());
}

#[test]
fn lifo_nesting_restores_original_destinations() {
    let targets = Targets::new().expect("targets");
    let outer = targets.redirect().native_out(None).runtime_out(None);
    let inner = targets.redirect().native_err(None).runtime_err(None);

    let outer_session = outer.enter().expect("outer");
    let inner_session = inner.enter().expect("inner");
    inner_session.finish().expect("finish inner");
    outer_session.finish().expect("finish outer");

    for target in [&targets.native_out, &targets.native_err] {
        target.write_all(b"plain").expect("write");
        assert_eq!(target.contents().expect("read"), b"plain");
    }
    targets.runtime_out.clone().write_all(b"plain").expect("write");
    targets.runtime_err.clone().write_all(b"plain").expect("write");
    assert_eq!(targets.runtime_out_sink.contents(), b"plain");
    assert_eq!(targets.runtime_err_sink.contents(), b"plain");
}
