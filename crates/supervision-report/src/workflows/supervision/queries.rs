//! Read-only warehouse statements.
//!
//! Bind order for both: `$1` range start (inclusive date), `$2` range end
//! (exclusive date), then the service code arrays noted on each statement.

/// Billed direct and supervision hours in the range.
///
/// `$3` direct service codes, `$4` supervision service codes. Direct entries
/// come back one row each. A supervision entry yields one row per direct
/// provider and location it overlaps on the same client, carrying only the
/// overlapping hours, plus one unattributed row for any time left over.
pub const BILLING_ENTRIES_SQL: &str = r#"
WITH base AS (
    SELECT
        b.billing_entry_id,
        b.client_contact_id,
        c.client_full_name,
        b.provider_contact_id,
        NULLIF(TRIM(CONCAT_WS(' ', p.first_name, p.last_name)), '') AS provider_name,
        COALESCE(b.service_location_name, '(Unknown)') AS service_location_name,
        sc.service_code,
        b.service_start_time,
        b.service_end_time,
        EXTRACT(EPOCH FROM (b.service_end_time - b.service_start_time)) / 3600.0 AS hours
    FROM dw2.billing_entries_current AS b
    INNER JOIN insights.service_code AS sc
        ON b.service_code_id = sc.service_code_id
    INNER JOIN insights.client AS c
        ON b.client_contact_id = c.client_id
    LEFT JOIN dw2.contacts AS p
        ON p.contact_id = b.provider_contact_id
    WHERE b.service_end_time >= $1
      AND b.service_end_time < $2
      AND (sc.service_code = ANY($3) OR sc.service_code = ANY($4))
),
overlap AS (
    SELECT
        s.billing_entry_id AS supervision_entry_id,
        d.provider_contact_id::text AS supervised_provider_id,
        d.service_location_name AS supervised_service_location,
        SUM(EXTRACT(EPOCH FROM (
            LEAST(d.service_end_time, s.service_end_time)
                - GREATEST(d.service_start_time, s.service_start_time)
        )) / 3600.0) AS hours
    FROM base AS s
    INNER JOIN base AS d
        ON d.client_contact_id = s.client_contact_id
       AND d.service_start_time < s.service_end_time
       AND d.service_end_time > s.service_start_time
    WHERE s.service_code = ANY($4)
      AND d.service_code = ANY($3)
    GROUP BY s.billing_entry_id, d.provider_contact_id, d.service_location_name
),
overlap_totals AS (
    SELECT supervision_entry_id, SUM(hours) AS hours
    FROM overlap
    GROUP BY supervision_entry_id
),
entries AS (
    SELECT
        b.billing_entry_id,
        b.hours,
        NULL::text AS supervised_provider_id,
        NULL::text AS supervised_service_location
    FROM base AS b
    WHERE b.service_code = ANY($3)
    UNION ALL
    SELECT
        o.supervision_entry_id,
        o.hours,
        o.supervised_provider_id,
        o.supervised_service_location
    FROM overlap AS o
    UNION ALL
    SELECT
        s.billing_entry_id,
        s.hours - COALESCE(t.hours, 0.0),
        NULL::text,
        NULL::text
    FROM base AS s
    LEFT JOIN overlap_totals AS t
        ON t.supervision_entry_id = s.billing_entry_id
    WHERE s.service_code = ANY($4)
      AND s.hours - COALESCE(t.hours, 0.0) > 0
)
SELECT
    b.client_contact_id::text AS client_id,
    b.client_full_name AS client_name,
    b.provider_contact_id::text AS provider_id,
    b.provider_name,
    b.service_location_name AS service_location,
    b.service_code,
    b.service_end_time::date AS service_date,
    ROUND(e.hours::numeric, 2)::float8 AS billed_hours,
    e.supervised_provider_id,
    e.supervised_service_location
FROM entries AS e
INNER JOIN base AS b
    ON b.billing_entry_id = e.billing_entry_id
ORDER BY b.client_full_name, b.provider_contact_id, b.service_start_time, e.supervised_provider_id
"#;

/// Certification-body supervision hours per provider. `$3` certification
/// service codes.
pub const CERTIFICATION_HOURS_SQL: &str = r#"
SELECT
    b.provider_contact_id::text AS provider_id,
    MAX(NULLIF(TRIM(CONCAT_WS(' ', p.first_name, p.last_name)), '')) AS provider_name,
    ROUND((SUM(EXTRACT(EPOCH FROM (b.service_end_time - b.service_start_time))) / 3600.0)::numeric, 2)::float8
        AS certification_hours,
    $1::date AS period_start,
    ($2::date - 1) AS period_end
FROM dw2.billing_entries_current AS b
INNER JOIN insights.service_code AS sc
    ON b.service_code_id = sc.service_code_id
LEFT JOIN dw2.contacts AS p
    ON p.contact_id = b.provider_contact_id
WHERE b.service_end_time >= $1
  AND b.service_end_time < $2
  AND sc.service_code = ANY($3)
GROUP BY b.provider_contact_id
ORDER BY b.provider_contact_id
"#;
