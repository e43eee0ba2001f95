use anacostia_migrate::Migration;

mod m_0_init;

pub(super) const MIGRATE_STEPS: &[&dyn Migration] = &[&m_0_init::MigrationStep {}];
