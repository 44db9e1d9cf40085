//! End-to-end enclave lifecycle: a normal-world core creates an enclave,
//! grants it read access to a shared data page, loads and donates its code
//! page, switches it in on a second core, and that enclave reads the shared
//! page successfully but faults on a write to a page it was never granted.

use enclave_sim_core::common::constants::{DRAM_BASE, MANAGEMENT_ENCLAVE_BASE};
use enclave_sim_core::common::Trap;
use enclave_sim_core::config::Config;
use enclave_sim_core::core::arch::csr;
use enclave_sim_core::core::enclave::EnclaveId;
use enclave_sim_core::core::enclave::MessageType;
use enclave_sim_core::Simulator;

use crate::common::{csrr, csrrw, ld, run_one, sb, sd, shim_step};

const NORMAL: usize = 0;
const ENCLAVE: usize = 1;

fn new_two_core_sim() -> Simulator {
    let config = Config {
        procs: 1,
        enclave_cores: 1,
        mem_mib: 16,
        ..Config::default()
    };
    Simulator::new(&config, &[], &[])
}

#[test]
fn normal_world_creates_donates_to_and_switches_an_enclave() {
    let mut sim = new_two_core_sim();
    assert_eq!(sim.cores.len(), 2);
    assert!(sim.cores[ENCLAVE].halted);

    let shared_data = DRAM_BASE + 0x4000;
    let code_page = DRAM_BASE + 0x1000;
    let ungranted_page = DRAM_BASE + 0x9000;

    // CREATE_ENCLAVE.
    sim.cores[NORMAL].regs.write(1, (MessageType::CreateEnclave as u64) << 56);
    run_one(&mut sim, NORMAL, csrrw(0, csr::SEND_MESSAGE, 1));
    shim_step(&mut sim);
    run_one(&mut sim, NORMAL, csrr(2, csr::RECEIVE_MESSAGE));
    let enclave_id = sim.cores[NORMAL].regs.read(2);
    assert_eq!(enclave_id, 1);

    // SET_ARGUMENT (shim-side) so DONATE_PAGE/SWITCH_ENCLAVE target this enclave.
    sim.cores[NORMAL].regs.write(3, (MessageType::SetArgument as u64) << 56 | enclave_id);
    run_one(&mut sim, NORMAL, csrrw(0, csr::SEND_MESSAGE, 3));
    shim_step(&mut sim);
    run_one(&mut sim, NORMAL, csrr(4, csr::RECEIVE_MESSAGE));
    assert_eq!(sim.cores[NORMAL].regs.read(4), 1);

    // Normal world writes a known value into a page it still owns, then
    // grants the enclave read-only access to it (SET_ARGUMENT_ID, the
    // core-local counterpart consumed by ASSIGN_READER).
    sim.cores[NORMAL].regs.write(5, shared_data);
    sim.cores[NORMAL].regs.write(6, 0xCAFE);
    run_one(&mut sim, NORMAL, sd(5, 6, 0));
    sim.cores[NORMAL].regs.write(7, enclave_id);
    run_one(&mut sim, NORMAL, csrrw(0, csr::SET_ARGUMENT_ID, 7));
    run_one(&mut sim, NORMAL, csrrw(0, csr::ASSIGN_READER, 5));

    // Load the enclave's two-instruction "program" into its code page while
    // the page is still owned by the normal world, then donate it.
    sim.cores[ENCLAVE].regs.write(6, shared_data);
    sim.cores[ENCLAVE].regs.write(7, ungranted_page);
    sim.system.bus.write_u32(code_page, ld(5, 6, 0));
    sim.system.bus.write_u32(code_page + 4, sb(7, 0, 0));

    sim.cores[NORMAL].regs.write(8, code_page);
    run_one(&mut sim, NORMAL, csrrw(0, csr::DONATE_PAGE, 8));
    shim_step(&mut sim);
    run_one(&mut sim, NORMAL, csrr(9, csr::RECEIVE_MESSAGE));
    assert_eq!(sim.cores[NORMAL].regs.read(9), 1, "donation must succeed");
    assert_eq!(sim.tag_directory.get(sim.tag_directory.page_of(code_page).unwrap()).owner, EnclaveId(1));

    // SWITCH_ENCLAVE onto the parked enclave core.
    sim.cores[NORMAL]
        .regs
        .write(10, (MessageType::SwitchEnclave as u64) << 56 | ENCLAVE as u64);
    run_one(&mut sim, NORMAL, csrrw(0, csr::SEND_MESSAGE, 10));
    shim_step(&mut sim);
    run_one(&mut sim, NORMAL, csrr(11, csr::RECEIVE_MESSAGE));
    assert_eq!(sim.cores[NORMAL].regs.read(11), 1, "switch must succeed");

    assert!(!sim.cores[ENCLAVE].halted);
    assert_eq!(sim.cores[ENCLAVE].enclave_id, EnclaveId(1));
    assert_eq!(sim.cores[ENCLAVE].pc, code_page);

    // Cross-enclave read via the granted reader tag succeeds.
    let eff = run_one(&mut sim, ENCLAVE, ld(5, 6, 0));
    assert!(!eff.trapped);
    assert_eq!(sim.cores[ENCLAVE].regs.read(5), 0xCAFE);

    // Cross-enclave write to a page never donated or granted faults, and the
    // core is redirected into the management shim's code region.
    let eff = run_one(&mut sim, ENCLAVE, sb(7, 0, 0));
    assert!(eff.trapped);
    assert!(matches!(sim.cores[ENCLAVE].last_trap, Some(Trap::StoreAccessFault(addr)) if addr == ungranted_page));
    assert_eq!(sim.cores[ENCLAVE].pc, MANAGEMENT_ENCLAVE_BASE);
}

#[test]
fn reserved_message_types_get_a_fixed_ack_and_mutate_no_state() {
    let mut sim = new_two_core_sim();
    let enclaves_before = sim.enclaves.len();

    sim.cores[NORMAL].regs.write(1, (MessageType::Attest as u64) << 56);
    run_one(&mut sim, NORMAL, csrrw(0, csr::SEND_MESSAGE, 1));
    shim_step(&mut sim);
    run_one(&mut sim, NORMAL, csrr(2, csr::RECEIVE_MESSAGE));

    assert_eq!(sim.cores[NORMAL].regs.read(2), 0);
    assert_eq!(sim.enclaves.len(), enclaves_before);
}
