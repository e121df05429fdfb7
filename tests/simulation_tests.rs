use chiller_sim::chiller::ChillerState;
use chiller_sim::codec::encode_f32;
use chiller_sim::registers::*;
use chiller_sim::*;

fn write_setting(registers: &SharedRegisters, value: f64) {
    let (high, low) = encode_f32(value);
    registers.with(|store| {
        store.write_register(SETTING_TEMP_REGISTER, high);
        store.write_register(SETTING_TEMP_REGISTER + 1, low);
    });
}

fn f32_of(value: f64) -> f64 {
    f64::from(value as f32)
}

#[cfg(test)]
mod reset_tests {
    use super::*;

    #[test]
    fn test_reset_restores_defaults_and_clears_coil() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());
        simulator.set_state(ChillerState {
            setting_temp_c: 20.0,
            entering_temp_c: 13.5,
            leaving_temp_c: 18.0,
        });

        // Freeze the model so the reset values are observable as-is
        registers.with(|store| {
            store.write_coil(COIL_SIMULATE, false);
            store.write_coil(COIL_RESET, true);
        });

        let report = simulator.tick(1_000);

        assert!(report.reset);
        assert_eq!(simulator.state(), ChillerState::default());
        assert!(!registers.lock().read_coil(COIL_RESET));
        assert_eq!(simulator.stats().resets, 1);
    }

    #[test]
    fn test_reset_then_valid_client_setting_overrides() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());

        write_setting(&registers, 18.0);
        registers.with(|store| {
            store.write_coil(COIL_SIMULATE, false);
            store.write_coil(COIL_RESET, true);
        });

        let report = simulator.tick(0);
        assert!(report.reset);
        assert!(report.setting_adopted);

        let state = simulator.state();
        assert_eq!(state.setting_temp_c, 18.0);
        assert_eq!(state.entering_temp_c, 12.0);
        assert_eq!(state.leaving_temp_c, 7.5);
    }

    #[test]
    fn test_reset_only_fires_once() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());
        registers.with(|store| store.write_coil(COIL_RESET, true));

        assert!(simulator.tick(0).reset);
        assert!(!simulator.tick(2_000).reset);
        assert_eq!(simulator.stats().resets, 1);
    }
}

#[cfg(test)]
mod setting_tests {
    use super::*;

    #[test]
    fn test_out_of_range_settings_are_ignored() {
        for rejected in [0.0, 35.0, 30.0, -4.0] {
            let registers = SharedRegisters::new();
            let mut simulator = ChillerSimulator::new(registers.clone());
            simulator.start();
            let before = simulator.state().setting_temp_c;

            write_setting(&registers, rejected);
            let report = simulator.tick(0);

            assert!(!report.setting_adopted, "{rejected} should be rejected");
            assert_eq!(simulator.state().setting_temp_c, before);
        }
    }

    #[test]
    fn test_valid_setting_is_adopted_and_republished() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());
        simulator.start();

        write_setting(&registers, 15.0);
        let report = simulator.tick(0);

        assert!(report.setting_adopted);
        assert_eq!(simulator.state().setting_temp_c, 15.0);
        assert_eq!(registers.lock().get_float_at(SETTING_TEMP_REGISTER), 15.0);
    }

    #[test]
    fn test_unset_registers_leave_default_setting() {
        // Registers start at zero, which decodes to 0.0 and is rejected
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());
        let report = simulator.tick(0);
        assert!(!report.setting_adopted);
        assert_eq!(simulator.state().setting_temp_c, 7.0);
    }
}

#[cfg(test)]
mod publish_tests {
    use super::*;

    #[test]
    fn test_paused_publish_leaves_registers_untouched() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());
        simulator.start();
        simulator.tick(0);

        registers.with(|store| store.write_coil(COIL_PUBLISH, false));
        let mut state = simulator.state();
        state.leaving_temp_c = 25.0;
        simulator.set_state(state);

        let before = registers.lock().read_block(0, 6);
        let report = simulator.tick(2_000);
        let after = registers.lock().read_block(0, 6);

        assert!(!report.published);
        assert_eq!(before, after);
        // The model still advanced internally
        assert!(simulator.state().leaving_temp_c < 25.0);
        assert_eq!(simulator.stats().paused_ticks, 1);
    }

    #[test]
    fn test_resuming_publish_writes_current_state() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());
        simulator.start();

        registers.with(|store| store.write_coil(COIL_PUBLISH, false));
        for tick in 0..3 {
            simulator.tick(tick * 2_000);
        }
        registers.with(|store| store.write_coil(COIL_PUBLISH, true));
        simulator.tick(6_000);

        let state = simulator.state();
        let store = registers.snapshot();
        assert_eq!(store.get_float_at(LEAVING_TEMP_REGISTER), f32_of(state.leaving_temp_c));
        assert_eq!(store.get_float_at(ENTERING_TEMP_REGISTER), f32_of(state.entering_temp_c));
    }
}

#[cfg(test)]
mod convergence_tests {
    use super::*;

    #[test]
    fn test_single_step_from_twelve_degrees() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers);
        simulator.set_state(ChillerState {
            setting_temp_c: 7.0,
            entering_temp_c: 12.0,
            leaving_temp_c: 12.0,
        });

        simulator.tick(0);
        assert!((simulator.state().leaving_temp_c - 11.5).abs() < 1e-12);
    }

    #[test]
    fn test_leaving_temperature_converges_monotonically() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers);
        simulator.set_state(ChillerState {
            setting_temp_c: 7.0,
            entering_temp_c: 12.0,
            leaving_temp_c: 12.0,
        });

        let mut previous = simulator.state().leaving_temp_c;
        for tick in 0..50u64 {
            simulator.tick(tick * 2_000);
            let leaving = simulator.state().leaving_temp_c;
            assert!(leaving < previous);
            assert!(leaving > 7.0);
            previous = leaving;
        }

        // 5°C * 0.9^50 ≈ 0.026°C
        assert!((previous - 7.0).abs() < 0.03);
    }

    #[test]
    fn test_frozen_simulation_holds_values() {
        let registers = SharedRegisters::new();
        let mut simulator = ChillerSimulator::new(registers.clone());
        simulator.start();
        simulator.tick(5_000);
        let before = simulator.state();

        registers.with(|store| store.write_coil(COIL_SIMULATE, false));
        let report = simulator.tick(90_000);

        assert!(!report.simulated);
        assert_eq!(simulator.state().entering_temp_c, before.entering_temp_c);
        assert_eq!(simulator.state().leaving_temp_c, before.leaving_temp_c);
    }
}

#[test]
fn test_end_to_end_first_tick() {
    let registers = SharedRegisters::new();
    let mut simulator = ChillerSimulator::new(registers.clone());
    simulator.start();

    let now_ms = 1_700_000_000_123;
    simulator.tick(now_ms);

    let store = registers.snapshot();
    let expected_entering = 12.0 + (now_ms as f64 / 10_000.0).sin() * 2.0;
    let expected_leaving = 7.5 + (7.0 - 7.5) * 0.1;

    assert_eq!(store.get_float_at(SETTING_TEMP_REGISTER), 7.0);
    assert_eq!(store.get_float_at(ENTERING_TEMP_REGISTER), f32_of(expected_entering));
    assert_eq!(store.get_float_at(LEAVING_TEMP_REGISTER), f32_of(expected_leaving));
    assert!((store.get_float_at(LEAVING_TEMP_REGISTER) - 7.45).abs() < 1e-5);
}

#[test]
fn test_ticks_serialize_against_client_writes() {
    use std::thread;

    let registers = SharedRegisters::new();
    let mut simulator = ChillerSimulator::new(registers.clone());
    simulator.start();

    // A client alternates between two valid settings; every tick must see
    // one of them whole, never a mix of halves.
    let writer = {
        let registers = registers.clone();
        thread::spawn(move || {
            let (a_hi, a_lo) = encode_f32(10.1);
            let (b_hi, b_lo) = encode_f32(22.3);
            for i in 0..2_000 {
                let (high, low) = if i % 2 == 0 { (a_hi, a_lo) } else { (b_hi, b_lo) };
                registers.with(|store| {
                    store.write_register(SETTING_TEMP_REGISTER, high);
                    store.write_register(SETTING_TEMP_REGISTER + 1, low);
                });
            }
        })
    };

    for tick in 0..500u64 {
        simulator.tick(tick);
        let setting = simulator.state().setting_temp_c;
        assert!(
            setting == 7.0 || setting == f32_of(10.1) || setting == f32_of(22.3),
            "torn setting {setting}"
        );
    }

    writer.join().unwrap();
}
