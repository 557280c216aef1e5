use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== FACILITIES ==========
        manager
            .create_table(
                Table::create()
                    .table(Facilities::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Facilities::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Facilities::Name).string_len(120).not_null())
                    .col(ColumnDef::new(Facilities::FacilityType).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Facilities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_facilities_type")
                    .table(Facilities::Table)
                    .col(Facilities::FacilityType)
                    .to_owned(),
            )
            .await?;

        // ========== UNITS ==========
        manager
            .create_table(
                Table::create()
                    .table(Units::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Units::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Units::Code)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Units::Title).string_len(120).not_null())
                    .to_owned(),
            )
            .await?;

        // ========== SENSORS ==========
        manager
            .create_table(
                Table::create()
                    .table(Sensors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sensors::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Sensors::UserId).uuid().not_null())
                    .col(ColumnDef::new(Sensors::FacilityId).uuid().not_null())
                    .col(ColumnDef::new(Sensors::Name).string_len(120).not_null())
                    .col(ColumnDef::new(Sensors::UnitId).uuid())
                    .col(ColumnDef::new(Sensors::MinVal).double())
                    .col(ColumnDef::new(Sensors::MaxVal).double())
                    .col(
                        ColumnDef::new(Sensors::SamplingS)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(Sensors::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Sensors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Sensors::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sensors_facility")
                            .from(Sensors::Table, Sensors::FacilityId)
                            .to(Facilities::Table, Facilities::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sensors_unit")
                            .from(Sensors::Table, Sensors::UnitId)
                            .to(Units::Table, Units::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sensors_facility_name")
                    .table(Sensors::Table)
                    .col(Sensors::FacilityId)
                    .col(Sensors::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sensors_user")
                    .table(Sensors::Table)
                    .col(Sensors::UserId)
                    .to_owned(),
            )
            .await?;

        // ========== ACTUATORS ==========
        manager
            .create_table(
                Table::create()
                    .table(Actuators::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Actuators::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Actuators::FacilityId).uuid())
                    .col(ColumnDef::new(Actuators::Name).string_len(120).not_null())
                    .col(ColumnDef::new(Actuators::ActuatorType).string_len(16).not_null())
                    .col(ColumnDef::new(Actuators::RangeMin).double())
                    .col(ColumnDef::new(Actuators::RangeMax).double())
                    .col(ColumnDef::new(Actuators::Step).double())
                    .col(
                        ColumnDef::new(Actuators::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Actuators::LastValue).double())
                    .col(
                        ColumnDef::new(Actuators::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Actuators::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_actuators_facility")
                            .from(Actuators::Table, Actuators::FacilityId)
                            .to(Facilities::Table, Facilities::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_actuators_facility")
                    .table(Actuators::Table)
                    .col(Actuators::FacilityId)
                    .to_owned(),
            )
            .await?;

        // ========== SENSOR <-> ACTUATOR ==========
        manager
            .create_table(
                Table::create()
                    .table(SensorActuators::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SensorActuators::SensorId).uuid().not_null())
                    .col(ColumnDef::new(SensorActuators::ActuatorId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .col(SensorActuators::SensorId)
                            .col(SensorActuators::ActuatorId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sensor_actuators_sensor")
                            .from(SensorActuators::Table, SensorActuators::SensorId)
                            .to(Sensors::Table, Sensors::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sensor_actuators_actuator")
                            .from(SensorActuators::Table, SensorActuators::ActuatorId)
                            .to(Actuators::Table, Actuators::Id),
                    )
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();

        db.execute_unprepared(
            "CREATE INDEX idx_sensor_actuators_actuator ON sensor_actuators (actuator_id)",
        )
        .await?;

        // ========== RULES ==========
        manager
            .create_table(
                Table::create()
                    .table(Rules::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rules::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Rules::UserId).uuid().not_null())
                    .col(ColumnDef::new(Rules::Name).string_len(160).not_null())
                    .col(ColumnDef::new(Rules::Expression).text().not_null())
                    .col(
                        ColumnDef::new(Rules::WindowS)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Rules::Severity).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Rules::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Rules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Rules::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        db.execute_unprepared("CREATE INDEX idx_rules_enabled ON rules (enabled, id)")
            .await?;

        // ========== RULE <-> SENSOR ==========
        manager
            .create_table(
                Table::create()
                    .table(RuleSensors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RuleSensors::RuleId).uuid().not_null())
                    .col(ColumnDef::new(RuleSensors::SensorId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .col(RuleSensors::RuleId)
                            .col(RuleSensors::SensorId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rule_sensors_rule")
                            .from(RuleSensors::Table, RuleSensors::RuleId)
                            .to(Rules::Table, Rules::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rule_sensors_sensor")
                            .from(RuleSensors::Table, RuleSensors::SensorId)
                            .to(Sensors::Table, Sensors::Id),
                    )
                    .to_owned(),
            )
            .await?;

        db.execute_unprepared("CREATE INDEX idx_rule_sensors_sensor ON rule_sensors (sensor_id)")
            .await?;

        // ========== RULE COMMANDS (templates issued on alert open) ==========
        manager
            .create_table(
                Table::create()
                    .table(RuleCommands::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RuleCommands::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RuleCommands::RuleId).uuid().not_null())
                    .col(ColumnDef::new(RuleCommands::ActuatorId).uuid().not_null())
                    .col(ColumnDef::new(RuleCommands::Name).string_len(16).not_null())
                    .col(ColumnDef::new(RuleCommands::Args).json().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rule_commands_rule")
                            .from(RuleCommands::Table, RuleCommands::RuleId)
                            .to(Rules::Table, Rules::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rule_commands_actuator")
                            .from(RuleCommands::Table, RuleCommands::ActuatorId)
                            .to(Actuators::Table, Actuators::Id),
                    )
                    .to_owned(),
            )
            .await?;

        db.execute_unprepared("CREATE INDEX idx_rule_commands_rule ON rule_commands (rule_id)")
            .await?;

        // ========== ALERTS ==========
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alerts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Alerts::RuleId).uuid().not_null())
                    .col(ColumnDef::new(Alerts::SensorId).uuid())
                    .col(ColumnDef::new(Alerts::Severity).string_len(16).not_null())
                    .col(ColumnDef::new(Alerts::State).string_len(16).not_null())
                    .col(ColumnDef::new(Alerts::Message).text())
                    .col(
                        ColumnDef::new(Alerts::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alerts::EndedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Alerts::AckBy).uuid())
                    .col(ColumnDef::new(Alerts::AckAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Alerts::Stale)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Alerts::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alerts_rule")
                            .from(Alerts::Table, Alerts::RuleId)
                            .to(Rules::Table, Rules::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alerts_sensor")
                            .from(Alerts::Table, Alerts::SensorId)
                            .to(Sensors::Table, Sensors::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Current-alert lookup per rule
        db.execute_unprepared("CREATE INDEX idx_alerts_rule_state ON alerts (rule_id, state)")
            .await?;

        // At most one non-closed alert per rule
        db.execute_unprepared(
            "CREATE UNIQUE INDEX idx_alerts_one_active_per_rule ON alerts (rule_id) WHERE state <> 'closed'",
        )
        .await?;

        db.execute_unprepared("CREATE INDEX idx_alerts_started_at ON alerts (started_at)")
            .await?;

        // ========== COMMANDS ==========
        manager
            .create_table(
                Table::create()
                    .table(Commands::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Commands::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Commands::ActuatorId).uuid().not_null())
                    .col(ColumnDef::new(Commands::Name).string_len(16).not_null())
                    .col(ColumnDef::new(Commands::IssuedBy).uuid())
                    .col(ColumnDef::new(Commands::RuleId).uuid())
                    .col(ColumnDef::new(Commands::AlertId).uuid())
                    .col(ColumnDef::new(Commands::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Commands::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Commands::SentAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Commands::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Commands::ErrorText).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_commands_actuator")
                            .from(Commands::Table, Commands::ActuatorId)
                            .to(Actuators::Table, Actuators::Id),
                    )
                    .to_owned(),
            )
            .await?;

        db.execute_unprepared(
            "CREATE INDEX idx_commands_actuator ON commands (actuator_id, issued_at DESC)",
        )
        .await?;
        db.execute_unprepared("CREATE INDEX idx_commands_status ON commands (status)")
            .await?;
        db.execute_unprepared(
            "CREATE INDEX idx_commands_alert ON commands (alert_id) WHERE alert_id IS NOT NULL",
        )
        .await?;

        // ========== COMMAND ARGS ==========
        manager
            .create_table(
                Table::create()
                    .table(CommandArgs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CommandArgs::CommandId).uuid().not_null())
                    .col(ColumnDef::new(CommandArgs::Name).string_len(64).not_null())
                    .col(ColumnDef::new(CommandArgs::Value).text().not_null())
                    .primary_key(
                        Index::create()
                            .col(CommandArgs::CommandId)
                            .col(CommandArgs::Name),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_command_args_command")
                            .from(CommandArgs::Table, CommandArgs::CommandId)
                            .to(Commands::Table, Commands::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== READINGS ==========
        // Readings are owned by the external time-series collaborator; no FK to sensors.
        manager
            .create_table(
                Table::create()
                    .table(Readings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Readings::SensorId).uuid().not_null())
                    .col(
                        ColumnDef::new(Readings::Time)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Readings::Value).double().not_null())
                    .primary_key(
                        Index::create()
                            .col(Readings::SensorId)
                            .col(Readings::Time),
                    )
                    .to_owned(),
            )
            .await?;

        db.execute_unprepared(
            "CREATE INDEX idx_readings_sensor_time ON readings (sensor_id, time DESC)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order of dependencies
        manager
            .drop_table(Table::drop().table(Readings::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CommandArgs::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Commands::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alerts::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RuleCommands::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RuleSensors::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rules::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SensorActuators::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Actuators::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sensors::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Units::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Facilities::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Facilities {
    Table,
    Id,
    Name,
    FacilityType,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Units {
    Table,
    Id,
    Code,
    Title,
}

#[derive(DeriveIden)]
enum Sensors {
    Table,
    Id,
    UserId,
    FacilityId,
    Name,
    UnitId,
    MinVal,
    MaxVal,
    SamplingS,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Actuators {
    Table,
    Id,
    FacilityId,
    Name,
    ActuatorType,
    RangeMin,
    RangeMax,
    Step,
    IsActive,
    LastValue,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SensorActuators {
    Table,
    SensorId,
    ActuatorId,
}

#[derive(DeriveIden)]
enum Rules {
    Table,
    Id,
    UserId,
    Name,
    Expression,
    WindowS,
    Severity,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RuleSensors {
    Table,
    RuleId,
    SensorId,
}

#[derive(DeriveIden)]
enum RuleCommands {
    Table,
    Id,
    RuleId,
    ActuatorId,
    Name,
    Args,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    RuleId,
    SensorId,
    Severity,
    State,
    Message,
    StartedAt,
    EndedAt,
    AckBy,
    AckAt,
    Stale,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Commands {
    Table,
    Id,
    ActuatorId,
    Name,
    IssuedBy,
    RuleId,
    AlertId,
    Status,
    IssuedAt,
    SentAt,
    CompletedAt,
    ErrorText,
}

#[derive(DeriveIden)]
enum CommandArgs {
    Table,
    CommandId,
    Name,
    Value,
}

#[derive(DeriveIden)]
enum Readings {
    Table,
    SensorId,
    Time,
    Value,
}
