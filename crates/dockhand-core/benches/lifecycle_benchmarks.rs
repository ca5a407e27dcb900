use criterion::{criterion_group, criterion_main, Criterion};
use dockhand_core::{Machine, PollPolicy};
use dockhand_driver::{MachineState, MockDriver};
use dockhand_provision::MockProvisioner;
use dockhand_schema::HostOptions;
use dockhand_store::{MachineStore, StoreLayout};
use std::sync::Arc;
use std::time::Duration;

fn mock_machine(state: MachineState, settle: u32) -> Machine {
    Machine::new(
        "bench",
        Box::new(
            MockDriver::new("bench")
                .with_state(state)
                .with_settle_polls(settle),
        ),
        HostOptions::default(),
    )
    .unwrap()
    .with_poll_policy(PollPolicy::new(settle + 2, Duration::ZERO))
}

fn bench_start_stop(c: &mut Criterion) {
    let machine = mock_machine(MachineState::Stopped, 0);
    c.bench_function("machine_start_stop_cycle", |b| {
        b.iter(|| {
            machine.start().unwrap();
            machine.stop().unwrap();
        });
    });
}

fn bench_start_settling(c: &mut Criterion) {
    c.bench_function("machine_start_settle_10", |b| {
        b.iter_with_setup(
            || mock_machine(MachineState::Stopped, 10),
            |machine| {
                machine.start().unwrap();
            },
        );
    });
}

fn bench_refused_transition(c: &mut Criterion) {
    let machine = mock_machine(MachineState::Running, 0);
    c.bench_function("machine_guard_refusal", |b| {
        b.iter(|| {
            let _ = machine.start().unwrap_err();
        });
    });
}

fn bench_restart(c: &mut Criterion) {
    let machine = mock_machine(MachineState::Running, 0);
    c.bench_function("machine_restart", |b| {
        b.iter(|| {
            machine.restart().unwrap();
        });
    });
}

fn bench_upgrade(c: &mut Criterion) {
    let machine = mock_machine(MachineState::Running, 0)
        .with_provisioners(Arc::new(MockProvisioner::new()));
    c.bench_function("machine_upgrade_mock", |b| {
        b.iter(|| {
            machine.upgrade().unwrap();
        });
    });
}

fn bench_save_load(c: &mut Criterion) {
    c.bench_function("machine_save_load", |b| {
        b.iter_with_setup(
            || {
                let store_dir = tempfile::tempdir().unwrap();
                let layout = StoreLayout::new(store_dir.path());
                layout.initialize().unwrap();
                let store = MachineStore::new(layout);
                let machine = mock_machine(MachineState::Running, 0);
                (store_dir, store, machine)
            },
            |(_sd, store, machine)| {
                machine.save(&store).unwrap();
                Machine::load(&store, "bench").unwrap();
            },
        );
    });
}

criterion_group!(
    benches,
    bench_start_stop,
    bench_start_settling,
    bench_refused_transition,
    bench_restart,
    bench_upgrade,
    bench_save_load,
);
criterion_main!(benches);
