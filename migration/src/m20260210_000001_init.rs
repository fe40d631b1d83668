use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Geometry columns need PostGIS
        manager
            .get_connection()
            .execute_unprepared("CREATE EXTENSION IF NOT EXISTS postgis")
            .await?;

        // ========== SENSORS ==========
        manager
            .create_table(
                Table::create()
                    .table(Sensors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sensors::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Sensors::Name)
                            .string_len(256)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Sensors::ParentId).big_integer())
                    .col(ColumnDef::new(Sensors::Metadata).json_binary())
                    .col(
                        ColumnDef::new(Sensors::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(
                        ColumnDef::new(Sensors::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Sensors::IsAvailable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sensors_parent")
                            .from(Sensors::Table, Sensors::ParentId)
                            .to(Sensors::Table, Sensors::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== TYPES ==========
        manager
            .create_table(
                Table::create()
                    .table(Types::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Types::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Types::Name)
                            .string_len(256)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Types::Description).text())
                    .col(ColumnDef::new(Types::Unit).string_len(64))
                    .col(ColumnDef::new(Types::DataType).string_len(16).not_null())
                    .col(ColumnDef::new(Types::Metadata).json_binary())
                    .to_owned(),
            )
            .await?;

        // ========== TIMESERIES ==========
        manager
            .create_table(
                Table::create()
                    .table(Timeseries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Timeseries::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Timeseries::SensorId).big_integer().not_null())
                    .col(ColumnDef::new(Timeseries::TypeId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Timeseries::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_timeseries_sensor")
                            .from(Timeseries::Table, Timeseries::SensorId)
                            .to(Sensors::Table, Sensors::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_timeseries_type")
                            .from(Timeseries::Table, Timeseries::TypeId)
                            .to(Types::Table, Types::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("timeseries_sensor_type_idx")
                    .table(Timeseries::Table)
                    .col(Timeseries::SensorId)
                    .col(Timeseries::TypeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========== PROVENANCE ==========
        manager
            .create_table(
                Table::create()
                    .table(Provenance::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Provenance::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Provenance::Uuid).uuid().not_null())
                    .col(ColumnDef::new(Provenance::Lineage).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Provenance::DataCollector)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Provenance::DataCollectorVersion).string_len(64))
                    .to_owned(),
            )
            .await?;

        // Natural key treats an absent collector version as the empty string
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX provenance_natural_key_idx ON provenance \
                 (lineage, data_collector, COALESCE(data_collector_version, ''))",
            )
            .await?;

        // ========== DATASETS ==========
        manager
            .create_table(
                Table::create()
                    .table(Datasets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Datasets::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Datasets::Name)
                            .string_len(256)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Datasets::Description).text())
                    .col(
                        ColumnDef::new(Datasets::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DatasetTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetTypes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DatasetTypes::DatasetId).uuid().not_null())
                    .col(
                        ColumnDef::new(DatasetTypes::TypeId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatasetTypes::IsRequired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DatasetTypes::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dataset_types_dataset")
                            .from(DatasetTypes::Table, DatasetTypes::DatasetId)
                            .to(Datasets::Table, Datasets::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dataset_types_type")
                            .from(DatasetTypes::Table, DatasetTypes::TypeId)
                            .to(Types::Table, Types::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("dataset_types_dataset_type_idx")
                    .table(DatasetTypes::Table)
                    .col(DatasetTypes::DatasetId)
                    .col(DatasetTypes::TypeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========== MEASUREMENTS (one table per datatype) ==========
        for (table, value_type) in [
            ("measurements_numeric", "double precision"),
            ("measurements_string", "text"),
            ("measurements_boolean", "boolean"),
            ("measurements_json", "jsonb"),
            ("measurements_geoposition", "geometry(Point, 4326)"),
            ("measurements_geoshape", "geometry(Polygon, 4326)"),
        ] {
            manager
                .get_connection()
                .execute_unprepared(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (\
                     timeseries_id uuid NOT NULL REFERENCES timeseries(id), \
                     \"timestamp\" timestamptz NOT NULL, \
                     value {value_type} NOT NULL, \
                     provenance_id bigint REFERENCES provenance(id), \
                     created_on timestamptz NOT NULL DEFAULT NOW(), \
                     UNIQUE (timeseries_id, \"timestamp\"))"
                ))
                .await?;

            // Serves latest-per-timeseries ranking and time-range scans
            manager
                .get_connection()
                .execute_unprepared(&format!(
                    "CREATE INDEX IF NOT EXISTS {table}_ts_time_idx \
                     ON {table} (timeseries_id, \"timestamp\" DESC)"
                ))
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            "measurements_numeric",
            "measurements_string",
            "measurements_boolean",
            "measurements_json",
            "measurements_geoposition",
            "measurements_geoshape",
        ] {
            manager
                .get_connection()
                .execute_unprepared(&format!("DROP TABLE IF EXISTS {table}"))
                .await?;
        }

        manager
            .drop_table(Table::drop().table(DatasetTypes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Datasets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Provenance::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Timeseries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Types::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sensors::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Sensors {
    Table,
    Id,
    Name,
    ParentId,
    Metadata,
    CreatedOn,
    IsActive,
    IsAvailable,
}

#[derive(DeriveIden)]
enum Types {
    Table,
    Id,
    Name,
    Description,
    Unit,
    DataType,
    Metadata,
}

#[derive(DeriveIden)]
enum Timeseries {
    Table,
    Id,
    SensorId,
    TypeId,
    CreatedOn,
}

#[derive(DeriveIden)]
enum Provenance {
    Table,
    Id,
    Uuid,
    Lineage,
    DataCollector,
    DataCollectorVersion,
}

#[derive(DeriveIden)]
enum Datasets {
    Table,
    Id,
    Name,
    Description,
    CreatedOn,
}

#[derive(DeriveIden)]
enum DatasetTypes {
    Table,
    Id,
    DatasetId,
    TypeId,
    IsRequired,
    CreatedOn,
}
