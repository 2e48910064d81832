//! Machine-parameter configuration.

use crate::advisor::partition::MachineParams;
use crate::test::helpers::with_env;

const ALL_UNSET: [(&str, Option<&str>); 4] = [
    ("PRISM_PARALLELISM", None),
    ("PRISM_VEC_LEN", None),
    ("PRISM_FAST_MEM", None),
    ("PRISM_BALANCE", None),
];

#[test]
fn defaults_without_overrides() {
    with_env(&ALL_UNSET, || {
        assert_eq!(MachineParams::from_env(), MachineParams::default());
    });
}

#[test]
fn each_variable_overrides_its_parameter() {
    let vars = [
        ("PRISM_PARALLELISM", Some("16")),
        ("PRISM_VEC_LEN", Some("4")),
        ("PRISM_FAST_MEM", Some("65536")),
        ("PRISM_BALANCE", Some("7")),
    ];
    with_env(&vars, || {
        let params = MachineParams::from_env();
        assert_eq!(params.parallelism, 16);
        assert_eq!(params.vec_len, 4);
        assert_eq!(params.fast_mem_size, 65536);
        assert_eq!(params.balance_fast_mem, 7);
        // The inline-level knobs carry no environment override.
        assert_eq!(params.inline_size, MachineParams::default().inline_size);
        assert_eq!(params.balance_inline, MachineParams::default().balance_inline);
    });
}

#[test]
fn overrides_apply_independently() {
    let vars = [
        ("PRISM_PARALLELISM", None),
        ("PRISM_VEC_LEN", None),
        ("PRISM_FAST_MEM", Some("131072")),
        ("PRISM_BALANCE", None),
    ];
    with_env(&vars, || {
        let params = MachineParams::from_env();
        assert_eq!(params.fast_mem_size, 131072);
        assert_eq!(params.parallelism, MachineParams::default().parallelism);
        assert_eq!(params.vec_len, MachineParams::default().vec_len);
        assert_eq!(params.balance_fast_mem, MachineParams::default().balance_fast_mem);
    });
}

#[test]
fn non_positive_values_are_rejected() {
    let vars = [
        ("PRISM_PARALLELISM", Some("0")),
        ("PRISM_VEC_LEN", Some("-3")),
        ("PRISM_FAST_MEM", None),
        ("PRISM_BALANCE", Some("-1")),
    ];
    with_env(&vars, || {
        assert_eq!(MachineParams::from_env(), MachineParams::default());
    });
}

#[test]
fn malformed_values_fall_back_to_defaults() {
    let vars = [
        ("PRISM_PARALLELISM", Some("lots")),
        ("PRISM_VEC_LEN", Some("")),
        ("PRISM_FAST_MEM", Some("256K")),
        ("PRISM_BALANCE", Some("7.5")),
    ];
    with_env(&vars, || {
        assert_eq!(MachineParams::from_env(), MachineParams::default());
    });
}
