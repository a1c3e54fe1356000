//! Behavior of the in-memory handler as seen through the handler traits.

use pretty_assertions::assert_eq;
use vpp_dataplane::{InMemoryDataplane, InterfaceApi, VppRetval};

#[test]
fn test_records_calls_in_order() {
    let dataplane = InMemoryDataplane::new();
    let idx = dataplane.add_loopback_interface("loop1").unwrap();
    dataplane.interface_admin_up(idx).unwrap();
    dataplane.dump_interfaces().unwrap();

    assert_eq!(
        dataplane.call_names(),
        vec!["add_loopback_interface", "interface_admin_up", "dump_interfaces"]
    );
    assert_eq!(dataplane.mutating_calls().len(), 2);
}

#[test]
fn test_failing_call_is_recorded_and_rejected() {
    let dataplane = InMemoryDataplane::new();
    dataplane.fail_call("add_loopback_interface");

    let err = dataplane.add_loopback_interface("loop1").unwrap_err();
    assert_eq!(err.retval_code(), Some(VppRetval::Unspecified));
    assert_eq!(dataplane.call_names(), vec!["add_loopback_interface"]);
    assert_eq!(dataplane.find_by_tag("loop1"), None);

    dataplane.clear_failures();
    assert!(dataplane.add_loopback_interface("loop1").is_ok());
}

#[test]
fn test_delete_unknown_handle_is_not_found() {
    let dataplane = InMemoryDataplane::new();
    let err = dataplane.delete_loopback_interface("loop9", 42).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_physical_interface_is_untagged() {
    let dataplane = InMemoryDataplane::new();
    let idx = dataplane.add_physical_interface("GigabitEthernet0/8/0", None);

    let dump = dataplane.dump_interfaces().unwrap();
    assert_eq!(dump.len(), 2);
    assert_eq!(dump[&idx].meta.internal_name, "GigabitEthernet0/8/0");
    assert_eq!(dump[&idx].meta.tag, "");
    assert_eq!(dataplane.take_notifications().len(), 0);
}
