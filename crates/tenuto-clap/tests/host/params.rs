//! Parameter catalog and value exchange

use crate::helpers::mock_plugin::{cookie_for, MockParam, GAIN, GAIN_INDEX, METER, MIX};
use crate::helpers::*;
use approx::assert_relative_eq;
use clap_sys::ext::params::{
    CLAP_PARAM_CLEAR_MODULATIONS, CLAP_PARAM_IS_AUTOMATABLE, CLAP_PARAM_RESCAN_ALL,
    CLAP_PARAM_RESCAN_INFO, CLAP_PARAM_RESCAN_VALUES,
};
use std::sync::atomic::Ordering;
use tenuto_clap::{HostError, HostEvent};

#[test]
fn test_scan_builds_catalog() {
    let (host, _probe) = loaded_host(GAIN_INDEX);
    let params = host.params();

    assert_eq!(params.ids(), &[GAIN, MIX, METER]);

    let gain = params.get(GAIN).unwrap();
    assert_eq!(gain.info().name, "Gain");
    assert_eq!(gain.info().module, "Main");
    assert_eq!((gain.info().min_value, gain.info().max_value), (0.0, 2.0));
    assert_eq!(gain.value(), 1.0);
    assert_eq!(gain.info().cookie.as_ptr() as usize, cookie_for(GAIN));
    assert!(gain.info().flags.is_automatable());

    assert!(params.get(METER).unwrap().info().flags.is_read_only());
    assert!(params.get(99).is_none());
}

#[test]
fn test_host_value_flushed_while_inactive() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);

    host.set_param_value_by_host(GAIN, 0.5).unwrap();
    assert_eq!(host.params().get(GAIN).unwrap().value(), 0.5);
    assert!(probe.received.lock().is_empty());

    host.idle().unwrap();
    assert_eq!(probe.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(*probe.received.lock(), vec![(GAIN, 0.5)]);
    assert_eq!(*probe.received_cookies.lock(), vec![cookie_for(GAIN)]);
    assert_eq!(probe.value(GAIN), Some(0.5));

    // Nothing left to flush.
    host.idle().unwrap();
    assert_eq!(probe.flushes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_inactive_flush_delivers_every_change() {
    let (mut host, probe) = loaded_host_with(test_config().event_capacity(1), GAIN_INDEX);

    host.set_param_value_by_host(GAIN, 0.5).unwrap();
    host.set_param_value_by_host(MIX, 0.7).unwrap();
    host.set_param_modulation_by_host(MIX, 0.1).unwrap();
    host.idle().unwrap();

    assert_eq!(probe.flushes.load(Ordering::SeqCst), 1);
    let mut received = probe.received.lock().clone();
    received.sort_by_key(|&(id, _)| id);
    assert_eq!(received, vec![(GAIN, 0.5), (MIX, 0.7)]);
    assert_eq!(*probe.modulations.lock(), vec![(MIX, 0.1)]);
}

#[test]
fn test_cookies_can_be_withheld() {
    let (mut host, probe) = loaded_host_with(test_config().provide_param_cookies(false), GAIN_INDEX);

    host.set_param_value_by_host(MIX, 0.1).unwrap();
    host.idle().unwrap();
    assert_eq!(*probe.received_cookies.lock(), vec![0]);
}

#[test]
fn test_host_value_validation() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);

    assert!(matches!(
        host.set_param_value_by_host(GAIN, 3.0),
        Err(HostError::ParamValueOutOfRange { id: GAIN, .. })
    ));
    assert!(matches!(
        host.set_param_value_by_host(GAIN, f64::NAN),
        Err(HostError::ParamValueOutOfRange { .. })
    ));
    assert!(matches!(
        host.set_param_value_by_host(METER, 0.5),
        Err(HostError::ReadOnlyParam(METER))
    ));
    assert!(matches!(
        host.set_param_value_by_host(99, 0.5),
        Err(HostError::UnknownParam(99))
    ));

    // Rejected changes leave no trace.
    assert_eq!(host.params().get(GAIN).unwrap().value(), 1.0);
    host.idle().unwrap();
    assert_eq!(probe.flushes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_active_values_coalesce_per_block() {
    let (mut host, mut processor, probe) = active_gain_host();

    host.set_param_value_by_host(GAIN, 0.2).unwrap();
    host.set_param_value_by_host(GAIN, 0.4).unwrap();
    host.set_param_value_by_host(GAIN, 0.8).unwrap();
    fill_inputs(&mut processor, 0.5);
    run_block(&mut processor).unwrap();

    assert_eq!(*probe.received.lock(), vec![(GAIN, 0.8)]);
    for &sample in processor.output(0).unwrap() {
        assert_relative_eq!(sample, 0.4, epsilon = 1e-6);
    }

    run_block(&mut processor).unwrap();
    assert_eq!(probe.received.lock().len(), 1);
}

#[test]
fn test_host_modulation() {
    let (mut host, mut processor, probe) = active_gain_host();

    host.set_param_modulation_by_host(MIX, -0.25).unwrap();
    assert_eq!(host.params().get(MIX).unwrap().modulation(), -0.25);
    assert!(host.set_param_modulation_by_host(MIX, 1.5).is_err());

    run_block(&mut processor).unwrap();
    assert_eq!(*probe.modulations.lock(), vec![(MIX, -0.25)]);
    // Modulation never touches the base value.
    assert_eq!(host.params().get(MIX).unwrap().value(), 0.5);
}

#[test]
fn test_plugin_changes_reach_catalog() {
    let (mut host, mut processor, _probe) = active_gain_host();
    drain_events(&host);

    run_block_with(&mut processor, |p| p.process_note_on(0, 0, 60, 127)).unwrap();
    assert_eq!(processor.output_events().len(), 3);

    host.idle().unwrap();
    let mix = host.params().get(MIX).unwrap();
    assert_relative_eq!(mix.value(), 1.0);
    assert!(!mix.is_adjusting());

    let events = drain_events(&host);
    assert!(events.contains(&HostEvent::ParamAdjusted { id: MIX, value: 1.0 }));
    assert!(events.contains(&HostEvent::ParamGesture {
        id: MIX,
        begin: false
    }));
}

#[test]
fn test_rescan_values() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);
    drain_events(&host);

    probe.set_value(GAIN, 1.5);
    probe.rescan(CLAP_PARAM_RESCAN_VALUES);
    host.idle().unwrap();

    assert_eq!(host.params().get(GAIN).unwrap().value(), 1.5);
    assert!(drain_events(&host).contains(&HostEvent::ParamsChanged));
}

#[test]
fn test_rescan_info() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);
    host.set_param_value_by_host(MIX, 0.9).unwrap();

    probe.params.lock()[1].name = "Blend";
    probe.rescan(CLAP_PARAM_RESCAN_INFO);
    host.idle().unwrap();

    let mix = host.params().get(MIX).unwrap();
    assert_eq!(mix.info().name, "Blend");
    assert_eq!(mix.value(), 0.9);
}

#[test]
fn test_rescan_info_cannot_change_param_set() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);

    probe.params.lock().pop();
    probe.rescan(CLAP_PARAM_RESCAN_INFO);
    host.idle().unwrap();

    assert_eq!(host.params().len(), 3);
}

#[test]
fn test_rescan_all_while_inactive() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);

    probe.params.lock().retain(|p| p.id != METER);
    probe
        .params
        .lock()
        .push(MockParam::new(4, "Drive", 0.0, 10.0, 2.0, CLAP_PARAM_IS_AUTOMATABLE));
    probe.rescan(CLAP_PARAM_RESCAN_ALL);
    host.idle().unwrap();

    assert_eq!(host.params().ids(), &[GAIN, MIX, 4]);
    assert_eq!(host.params().get(4).unwrap().value(), 2.0);
    assert!(host.params().get(METER).is_none());
}

#[test]
fn test_rescan_all_rejected_while_active() {
    let (mut host, _processor, probe) = active_gain_host();

    probe
        .params
        .lock()
        .push(MockParam::new(4, "Drive", 0.0, 10.0, 2.0, CLAP_PARAM_IS_AUTOMATABLE));
    probe.rescan(CLAP_PARAM_RESCAN_ALL);
    host.idle().unwrap();

    assert_eq!(host.params().len(), 3);
}

#[test]
fn test_clear_modulations() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);
    host.set_param_modulation_by_host(MIX, 0.3).unwrap();

    probe.clear(MIX, CLAP_PARAM_CLEAR_MODULATIONS);
    probe.clear(99, CLAP_PARAM_CLEAR_MODULATIONS);
    host.idle().unwrap();

    assert_eq!(host.params().get(MIX).unwrap().modulation(), 0.0);
}

#[test]
fn test_request_flush_while_inactive() {
    let (mut host, probe) = loaded_host(GAIN_INDEX);
    probe.request_flush();
    host.idle().unwrap();
    assert_eq!(probe.flushes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_value_text_conversion() {
    let (host, _probe) = loaded_host(GAIN_INDEX);

    assert_eq!(host.param_value_to_text(GAIN, 0.5).unwrap(), "0.50x");
    // The plugin cannot format Mix: plain number.
    assert_eq!(host.param_value_to_text(MIX, 0.25).unwrap(), "0.25");
    assert!(matches!(
        host.param_value_to_text(99, 0.0),
        Err(HostError::UnknownParam(99))
    ));

    assert_eq!(host.param_text_to_value(GAIN, "1.25x").unwrap(), Some(1.25));
    assert_eq!(host.param_text_to_value(GAIN, "loud").unwrap(), None);
    assert_eq!(host.param_text_to_value(MIX, "0.5").unwrap(), None);
}
