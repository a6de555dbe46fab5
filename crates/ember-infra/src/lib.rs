//! Terraform-backed implementation of the provisioner boundary.
//!
//! Renders the runner plan, shells out to the terraform CLI for
//! init/apply/destroy, and loads/saves the state document.

mod template;

mod terraform;
pub use terraform::TerraformCli;
