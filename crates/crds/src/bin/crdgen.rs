//! Prints the CapacityBuffer CRD manifest as YAML.
//!
//! Usage: `cargo run --bin crdgen > capacitybuffer-crd.yaml`

use crds::CapacityBuffer;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&CapacityBuffer::crd())?);
    Ok(())
}
