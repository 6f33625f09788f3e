use std::sync::Arc;

use crate::core::hardware::VolumeAdapter;

mod simulated;
mod system;

pub use simulated::{SimulatedAdapter, Simulator};
pub use system::SysinfoAdapter;

/// Pick the volume adapter. In simulation mode a stdin reader drives the
/// simulator: `add <id>`, `rm <id>`, `fail`.
pub fn get_adapter(simulation: bool, simulation_root: &std::path::Path) -> Arc<dyn VolumeAdapter> {
    if !simulation {
        return Arc::new(SysinfoAdapter);
    }

    let (adapter, controller) = SimulatedAdapter::new(simulation_root);

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lines().map_while(Result::ok) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let result = match parts.as_slice() {
                ["add", id] => controller.add_volume(id).map(|_| ()),
                ["rm", id] => {
                    controller.remove_volume(id);
                    Ok(())
                }
                ["fail"] => {
                    controller.fail_next_listing();
                    Ok(())
                }
                _ => {
                    println!("(Simulator) Use: 'add <id>', 'rm <id>' or 'fail'");
                    Ok(())
                }
            };
            if let Err(e) = result {
                println!("(Simulator) {:#}", e);
            }
        }
    });

    Arc::new(adapter)
}
