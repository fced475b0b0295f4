use clap::Parser;
use clap_num::maybe_hex;
use rv32sim::cpu::Cpu;
use rv32sim::loader::load_hex_file;
use std::process::ExitCode;

/// Simulate an RV32I program image
///
/// Loads a hex-text image (one 32-bit instruction per line), runs it
/// until the halt word, a zero word or the cycle budget, and prints
/// the final register and memory state.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the hex program image
    #[arg(default_value = "test_base.hex")]
    image: String,

    /// Print each instruction as it executes
    #[arg(short, long)]
    verbose: bool,

    /// Stop after this many executed instructions
    #[arg(long, default_value_t = 1000)]
    max_cycles: u64,

    /// Load and start at this address (use 0x prefix for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>, default_value_t = 0)]
    start_address: u32,

    /// Run through zero words instead of halting on them
    #[arg(long)]
    no_zero_halt: bool,

    /// Print the 8-word memory region starting from this address
    /// after the run (use 0x prefix for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>)]
    memory: Option<u32>,
}

fn print_memory(cpu: &Cpu, base: u32) {
    for n in 0..8 {
        let addr = base.wrapping_add(4 * n);
        let word = cpu.memory.read_word(addr);
        println!("{addr:x}: {word:x}");
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut cpu = Cpu::new();
    cpu.set_halt_on_zero_word(!args.no_zero_halt);
    cpu.pc = args.start_address;

    println!("Loading: {}", args.image);
    let count = match load_hex_file(&args.image, &mut cpu.memory, args.start_address) {
        Ok(count) => count,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Loaded {count} instructions\n");

    println!("Starting execution...");
    println!("PC = 0x{:08X}\n", cpu.pc);
    cpu.run(args.max_cycles, args.verbose);

    println!("\nFinished after {} cycles", cpu.cycles());
    println!("{}", "=".repeat(60));
    println!("FINAL STATE");
    println!("{}", "=".repeat(60));
    print!("{}", cpu.final_state_report());
    if let Some(base) = args.memory {
        println!("\nMemory window:");
        print_memory(&cpu, base);
    }
    println!("{}", "=".repeat(60));

    ExitCode::SUCCESS
}
